//! Example task callables used by the demo workload and by the
//! integration tests. Every worker rank must register the same set under
//! the same names before the cluster starts accepting submissions.

use meshtask_core::CallableRegistry;
use meshtask_messages::ArgTree;

pub fn register_builtin(registry: &mut CallableRegistry) {
    registry.register("add", add);
    registry.register("mul", mul);
    registry.register("echo", echo);
    registry.register("fail", fail);
}

fn binary_ints(args: &ArgTree) -> Result<(i64, i64), String> {
    let ArgTree::Tuple(items) = args else { return Err("expected a 2-tuple of integers".to_string()) };
    if items.len() != 2 {
        return Err(format!("expected 2 arguments, got {}", items.len()));
    }
    let a: i64 = items[0].decode().ok_or("argument 0 is not an i64")?;
    let b: i64 = items[1].decode().ok_or("argument 1 is not an i64")?;
    Ok((a, b))
}

fn add(args: &ArgTree, _kwargs: &ArgTree, _num_returns: usize) -> Result<Vec<Vec<u8>>, String> {
    let (a, b) = binary_ints(args)?;
    Ok(vec![bincode::serialize(&(a + b)).expect("i64 always encodes")])
}

fn mul(args: &ArgTree, _kwargs: &ArgTree, _num_returns: usize) -> Result<Vec<Vec<u8>>, String> {
    let (a, b) = binary_ints(args)?;
    Ok(vec![bincode::serialize(&(a * b)).expect("i64 always encodes")])
}

/// Returns its single argument unchanged; used to exercise id forwarding
/// without depending on arithmetic.
fn echo(args: &ArgTree, _kwargs: &ArgTree, _num_returns: usize) -> Result<Vec<Vec<u8>>, String> {
    let ArgTree::Tuple(items) = args else { return Err("expected a 1-tuple".to_string()) };
    let bytes = items.first().and_then(|item| item.decode::<Vec<u8>>()).ok_or("argument 0 missing")?;
    Ok(vec![bytes])
}

/// Always fails; used to exercise `TaskOutcome::Failed` propagation.
fn fail(args: &ArgTree, _kwargs: &ArgTree, _num_returns: usize) -> Result<Vec<Vec<u8>>, String> {
    let message: String = match args {
        ArgTree::Tuple(items) => items.first().and_then(|item| item.decode()).unwrap_or_else(|| "task raised".to_string()),
        _ => "task raised".to_string(),
    };
    Err(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sums_two_integers() {
        let args = ArgTree::Tuple(vec![ArgTree::value(&2i64), ArgTree::value(&3i64)]);
        let out = add(&args, &ArgTree::Map(vec![]), 1).unwrap();
        assert_eq!(bincode::deserialize::<i64>(&out[0]).unwrap(), 5);
    }

    #[test]
    fn fail_always_errors() {
        let args = ArgTree::Tuple(vec![ArgTree::value(&"boom".to_string())]);
        let err = fail(&args, &ArgTree::Map(vec![]), 1).unwrap_err();
        assert_eq!(err, "boom");
    }
}
