use serde::Deserialize;
use serde::Serialize;

use crate::id::BaseId;

/// A structurally-preserving tree over task arguments. Leaves are either a
/// plain bincode-encoded value or an unresolved `BaseId`; containers mirror
/// Python's list/tuple/dict shapes closely enough to walk and resolve
/// generically, per the "nested-container arg walking" design note: given a
/// tree with opaque ids at leaves, produce a structurally identical tree
/// with each id resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArgTree {
    Value(Vec<u8>),
    Id(BaseId),
    List(Vec<ArgTree>),
    Tuple(Vec<ArgTree>),
    Map(Vec<(String, ArgTree)>),
}

impl ArgTree {
    pub fn value<T: Serialize>(v: &T) -> Self {
        ArgTree::Value(bincode::serialize(v).expect("value is bincode-serializable"))
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        match self {
            ArgTree::Value(bytes) => bincode::deserialize(bytes).ok(),
            _ => None,
        }
    }

    /// Visits every leaf id in the tree.
    pub fn for_each_id(&self, mut visit: impl FnMut(BaseId)) {
        fn walk(node: &ArgTree, visit: &mut impl FnMut(BaseId)) {
            match node {
                ArgTree::Id(id) => visit(*id),
                ArgTree::Value(_) => {},
                ArgTree::List(items) | ArgTree::Tuple(items) => {
                    for item in items {
                        walk(item, visit);
                    }
                },
                ArgTree::Map(entries) => {
                    for (_, item) in entries {
                        walk(item, visit);
                    }
                },
            }
        }
        walk(self, &mut visit);
    }

    /// Replaces every leaf id for which `resolve` returns `Some`, leaving
    /// unresolved ids untouched and reporting whether any remain pending.
    pub fn materialize(&self, resolve: &mut impl FnMut(BaseId) -> Option<Vec<u8>>) -> (ArgTree, bool) {
        match self {
            ArgTree::Id(id) => {
                match resolve(*id) {
                    Some(bytes) => (ArgTree::Value(bytes), false),
                    None => (ArgTree::Id(*id), true),
                }
            },
            ArgTree::Value(bytes) => (ArgTree::Value(bytes.clone()), false),
            ArgTree::List(items) => {
                let mut pending = false;
                let resolved = items
                    .iter()
                    .map(|item| {
                        let (value, p) = item.materialize(resolve);
                        pending |= p;
                        value
                    })
                    .collect();
                (ArgTree::List(resolved), pending)
            },
            ArgTree::Tuple(items) => {
                let mut pending = false;
                let resolved = items
                    .iter()
                    .map(|item| {
                        let (value, p) = item.materialize(resolve);
                        pending |= p;
                        value
                    })
                    .collect();
                (ArgTree::Tuple(resolved), pending)
            },
            ArgTree::Map(entries) => {
                let mut pending = false;
                let resolved = entries
                    .iter()
                    .map(|(k, item)| {
                        let (value, p) = item.materialize(resolve);
                        pending |= p;
                        (k.clone(), value)
                    })
                    .collect();
                (ArgTree::Map(resolved), pending)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_resolves_nested_ids() {
        let id_a = BaseId::new(2, 1);
        let id_b = BaseId::new(2, 2);
        let tree = ArgTree::List(vec![
            ArgTree::Id(id_a),
            ArgTree::Map(vec![("k".to_string(), ArgTree::Id(id_b))]),
        ]);

        let (resolved, pending) = tree.materialize(&mut |id| {
            if id == id_a {
                Some(bincode::serialize(&7i64).unwrap())
            } else {
                None
            }
        });

        assert!(pending);
        match resolved {
            ArgTree::List(items) => {
                assert!(matches!(items[0], ArgTree::Value(_)));
                match &items[1] {
                    ArgTree::Map(entries) => assert!(matches!(entries[0].1, ArgTree::Id(_))),
                    _ => panic!("expected map"),
                }
            },
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn for_each_id_visits_all_leaves() {
        let id_a = BaseId::new(2, 1);
        let id_b = BaseId::new(3, 9);
        let tree = ArgTree::Tuple(vec![ArgTree::Id(id_a), ArgTree::value(&5i64), ArgTree::Id(id_b)]);
        let mut seen = vec![];
        tree.for_each_id(|id| seen.push(id));
        assert_eq!(seen, vec![id_a, id_b]);
    }
}
