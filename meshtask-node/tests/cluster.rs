use meshtask_core::CallableRegistry;
use meshtask_core::CoreError;
use meshtask_messages::ArgTree;
use meshtask_node::callables;
use meshtask_node::config::Config;
use meshtask_node::run_cluster;

fn registry() -> CallableRegistry {
    let mut registry = CallableRegistry::new();
    callables::register_builtin(&mut registry);
    registry
}

fn config(worker_count: u32) -> Config {
    let mut config = Config::load(None);
    config.cluster.worker_count = worker_count;
    config
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let mut cluster = run_cluster(&config(2), registry());

    let id = cluster.controller.put(bincode::serialize(&42i64).unwrap());
    let bytes = cluster.controller.get(&id).await.unwrap();
    assert_eq!(bincode::deserialize::<i64>(&bytes).unwrap(), 42);

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn output_of_one_task_feeds_another_without_visiting_controller_value() {
    let mut cluster = run_cluster(&config(3), registry());

    // 2 + 3, scheduled round-robin onto one worker.
    let first = cluster
        .controller
        .submit("add", ArgTree::Tuple(vec![ArgTree::value(&2i64), ArgTree::value(&3i64)]), ArgTree::Map(vec![]), 1)
        .await
        .unwrap();

    // (2 + 3) * 10, referencing the first task's output id directly —
    // the controller never learns the intermediate value, only forwards
    // the id or a PUT_OWNER pointer to whichever worker resolves it.
    let second = cluster
        .controller
        .submit(
            "mul",
            ArgTree::Tuple(vec![ArgTree::Id(first[0].base()), ArgTree::value(&10i64)]),
            ArgTree::Map(vec![]),
            1,
        )
        .await
        .unwrap();

    let bytes = cluster.controller.get(&second[0]).await.unwrap();
    assert_eq!(bincode::deserialize::<i64>(&bytes).unwrap(), 50);

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn wait_returns_once_enough_outputs_are_ready() {
    let mut cluster = run_cluster(&config(3), registry());

    let a = cluster
        .controller
        .submit("add", ArgTree::Tuple(vec![ArgTree::value(&1i64), ArgTree::value(&1i64)]), ArgTree::Map(vec![]), 1)
        .await
        .unwrap();
    let b = cluster
        .controller
        .submit("add", ArgTree::Tuple(vec![ArgTree::value(&2i64), ArgTree::value(&2i64)]), ArgTree::Map(vec![]), 1)
        .await
        .unwrap();

    let ids = vec![a[0].clone(), b[0].clone()];
    let (ready, not_ready) = cluster.controller.wait(&ids, 1).await.unwrap();
    assert_eq!(ready.len() + not_ready.len(), 2);
    assert!(ready.len() >= 1);

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn a_failed_task_reports_through_the_id_not_through_wait() {
    let mut cluster = run_cluster(&config(2), registry());

    let output = cluster
        .controller
        .submit("fail", ArgTree::Tuple(vec![ArgTree::value(&"deliberate failure".to_string())]), ArgTree::Map(vec![]), 1)
        .await
        .unwrap();

    let err = cluster.controller.get(&output[0]).await.unwrap_err();
    match err {
        CoreError::UserTaskFailure { message, .. } => assert_eq!(message, "deliberate failure"),
        other => panic!("expected UserTaskFailure, got {other:?}"),
    }

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn a_downstream_task_fails_when_its_dependency_failed() {
    let mut cluster = run_cluster(&config(3), registry());

    let upstream = cluster
        .controller
        .submit("fail", ArgTree::Tuple(vec![ArgTree::value(&"upstream broke".to_string())]), ArgTree::Map(vec![]), 1)
        .await
        .unwrap();

    let downstream = cluster
        .controller
        .submit("mul", ArgTree::Tuple(vec![ArgTree::Id(upstream[0].base()), ArgTree::value(&2i64)]), ArgTree::Map(vec![]), 1)
        .await
        .unwrap();

    let err = cluster.controller.get(&downstream[0]).await.unwrap_err();
    assert!(matches!(err, CoreError::UserTaskFailure { .. }));

    cluster.shutdown().await.unwrap();
}
