//! End-to-end data lifecycle scenarios against a fake fleet.

mod common;

use common::{FakeFleet, Harness};
use gavel_core::{CoreError, RunFlags, RunRequest, ScaleTarget};
use gavel_orchestrator::{DataSource, LifecycleError};

fn load_db() -> RunFlags {
    RunFlags {
        load_db: true,
        ..RunFlags::default()
    }
}

/// Index of every auction-preparation command (not readiness checks).
fn preparations(h: &Harness) -> Vec<usize> {
    h.fleet
        .commands()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.contains("dbPrep -a") && !c.ends_with(" -c") && !c.contains("-a 0 "))
        .map(|(i, _)| i)
        .collect()
}

#[tokio::test]
async fn users_without_backup_are_loaded_when_requested() {
    let h = Harness::new(FakeFleet::default(), 2, 0);
    let request = RunRequest::for_users(125).with_flags(load_db());

    let report = h.orchestrator().prepare_data(&request).await.unwrap();

    assert_eq!(report.target, ScaleTarget::Users(125));
    assert_eq!(report.source, DataSource::Loaded);
    let fleet = &h.fleet;

    // (a) tear down and clear before loading
    let clear = fleet.first("clear-data").unwrap();
    assert!(fleet.first("pg-cleanup").unwrap() < clear);
    assert!(fleet.first("pg-remove").unwrap() < clear);

    // (b) sharded cluster configured after the fresh start
    let add_shard = fleet.first("sh.addShard").unwrap();
    assert!(clear < add_shard);
    assert_eq!(fleet.count("sh.addShard"), 2);

    // (c) loader launched for 125 users
    let launch = fleet.first("nohup").unwrap();
    assert!(add_shard < launch);
    assert!(fleet.find("nohup")[0].contains("-u 125"));
    assert!(fleet.find("nohup")[0].contains("SPRING_PROFILES_ACTIVE=postgresql,mongodb nohup"));

    // (d) readiness verified after the loader finished
    let checks = fleet.checks();
    assert!(checks.iter().any(|&i| i > launch));

    // (e) auctions prepared for the same target after verification
    let prep = preparations(&h);
    assert_eq!(prep.len(), 1);
    assert!(prep[0] > *checks.last().unwrap());
    assert_eq!(
        fleet.commands()[prep[0]],
        "cd /opt/loader && SPRING_PROFILES_ACTIVE=postgresql,mongodb dbPrep -a 9 -m 2 -p 0 -f 420 -u 125"
    );
    assert_eq!(report.auctions, 9);

    // services stopped and ports dropped for the caller's run
    assert_eq!(fleet.commands().last().unwrap(), "pg-stop");
    assert!(h.app.registered_ports().is_empty());

    assert!(h.stage_log("loadData").contains("nohup dbLoader"));
    assert!(h.stage_log("configureNosql").contains("sh.stopBalancer()"));
}

#[tokio::test]
async fn matching_backup_is_restored_instead_of_loading() {
    let h = Harness::new(FakeFleet::default().with_backup(true), 0, 0);
    let request = RunRequest::for_scale(2).with_flags(load_db());

    let report = h.orchestrator().prepare_data(&request).await.unwrap();

    assert_eq!(report.source, DataSource::Restored);
    assert_eq!(h.fleet.count("nohup"), 0);
    assert_eq!(h.fleet.count("cp -a /mnt/dbBackup/postgresql-filesystem-2/data/. /mnt/dbData/postgresql/"), 1);
    assert_eq!(h.fleet.count("cp -a /mnt/imageStoreBackup/2/images/. /mnt/imageStore/"), 1);
    assert!(h.fleet.ran_while_stopped("cp -a"));
    let prep = preparations(&h);
    assert!(h.fleet.commands()[prep[0]].ends_with("-s 2"));
}

#[tokio::test]
async fn loaded_data_is_cleaned_and_reused() {
    let h = Harness::new(FakeFleet::default().with_data(true), 0, 0);
    let request = RunRequest::for_users(125).with_flags(load_db());

    let report = h.orchestrator().prepare_data(&request).await.unwrap();

    assert_eq!(report.source, DataSource::AlreadyLoaded);
    assert_eq!(h.fleet.count("nohup"), 0);
    assert_eq!(h.fleet.count("clear-data"), 0);
    assert_eq!(h.fleet.count("dbPrep -a 0 "), 1);
    assert_eq!(h.fleet.count("test -d"), 0);
    assert!(!report.backed_up);
}

#[tokio::test]
async fn missing_data_without_load_flag_is_an_error() {
    let h = Harness::new(FakeFleet::default(), 0, 0);

    let err = h
        .orchestrator()
        .prepare_data(&RunRequest::for_users(125))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::DataMissing { target: ScaleTarget::Users(125) }));
    assert!(err.to_string().contains("--load-db"));
    assert_eq!(h.fleet.count("nohup"), 0);
    assert!(preparations(&h).is_empty());
}

#[tokio::test]
async fn reload_replaces_present_data_and_is_one_shot() {
    let h = Harness::new(FakeFleet::default().with_data(true), 0, 0);
    let request = RunRequest::for_users(125).with_flags(RunFlags {
        reload_db: true,
        load_db: true,
        ..RunFlags::default()
    });

    let report = h.orchestrator().prepare_data(&request).await.unwrap();

    assert_eq!(report.source, DataSource::Reloaded);
    assert_eq!(h.fleet.count("nohup"), 1);
    assert!(h.fleet.first("clear-data").unwrap() < h.fleet.first("nohup").unwrap());
    assert!(!report.next_request.flags.reload_db);
    assert!(report.next_request.flags.load_db);
    assert_eq!(report.next_request.users, 125);
}

#[tokio::test]
async fn fresh_load_is_backed_up_while_services_are_stopped() {
    let h = Harness::new(FakeFleet::default(), 0, 0);
    let request = RunRequest::for_users(125).with_flags(RunFlags {
        load_db: true,
        backup: true,
        ..RunFlags::default()
    });

    let report = h.orchestrator().prepare_data(&request).await.unwrap();

    assert!(report.backed_up);
    let backup = h.fleet.first("cp -a /mnt/dbData/postgresql/. /mnt/dbBackup/postgresql-filesystem-125/data/").unwrap();
    assert!(h.fleet.first("nohup").unwrap() < backup);
    assert!(h.fleet.ran_while_stopped("cp -a"));
    assert!(backup < preparations(&h)[0]);
    assert!(report.next_request.flags.backup);
}

#[tokio::test]
async fn reused_data_is_not_backed_up_without_rebackup() {
    let h = Harness::new(FakeFleet::default().with_data(true), 0, 0);
    let request = RunRequest::for_users(125).with_flags(RunFlags {
        backup: true,
        ..RunFlags::default()
    });

    let report = h.orchestrator().prepare_data(&request).await.unwrap();

    assert!(!report.backed_up);
    assert_eq!(h.fleet.count("cp -a"), 0);
}

#[tokio::test]
async fn rebackup_snapshots_reused_data_once() {
    let h = Harness::new(FakeFleet::default().with_data(true), 0, 0);
    let request = RunRequest::for_users(125).with_flags(RunFlags {
        rebackup: true,
        ..RunFlags::default()
    });

    let report = h.orchestrator().prepare_data(&request).await.unwrap();

    assert!(report.backed_up);
    assert!(h.fleet.count("/mnt/mongoBackup/filesystem-125-0s-0r/configdb1") > 0);
    assert!(!report.next_request.flags.rebackup);
}

#[tokio::test]
async fn backup_then_restore_verifies_without_the_loader() {
    let h = Harness::new(FakeFleet::default().with_data(true), 0, 0);
    let orchestrator = h.orchestrator();
    let target = ScaleTarget::Scale(2);

    orchestrator.start_fresh(target, "test").await.unwrap();
    orchestrator.backup_data(target).await.unwrap();
    assert!(orchestrator.is_backup_available(target).await.unwrap());

    h.fleet.set_data_loaded(false);
    assert!(!orchestrator.is_data_loaded(target, 0).await.unwrap());

    orchestrator.restore_data(target).await.unwrap();
    assert!(orchestrator.is_data_loaded(target, 0).await.unwrap());
    assert_eq!(h.fleet.count("nohup"), 0);
    assert!(h.fleet.ran_while_stopped("cp -a"));
}

#[tokio::test]
async fn sharded_and_replicated_fails_before_any_command() {
    let logs = tempfile::tempdir().unwrap();
    let mut config =
        gavel_core::HarnessConfig::from_toml_str(&common::config_toml(logs.path(), 2, 0)).unwrap();
    config.app.num_nosql_replicas = 2;
    let h = Harness::from_config(FakeFleet::default(), config, logs);

    let err = h
        .orchestrator()
        .prepare_data(&RunRequest::for_users(125).with_flags(load_db()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Core(CoreError::UnsupportedTopology { shards: 2, replicas: 2 })
    ));
    assert!(h.fleet.calls().is_empty());
}

#[tokio::test]
async fn replicated_run_syncs_before_shutting_down() {
    let h = Harness::new(FakeFleet::default(), 0, 2);
    let request = RunRequest::for_users(125).with_flags(load_db());

    h.orchestrator().prepare_data(&request).await.unwrap();

    let initiate = h.fleet.find("rs.initiate");
    assert_eq!(initiate.len(), 1);
    assert!(initiate[0].contains("--host m1:27017"));
    assert_eq!(h.fleet.count("rs.add(\"m2:27017\")"), 1);

    let last_sync = h.fleet.last("rs.status()").unwrap();
    assert!(preparations(&h)[0] < last_sync);
    assert!(last_sync < h.fleet.last("pg-stop").unwrap());
    assert!(h.stage_log("replicaSync").contains("in sync after 1 polls"));
}

#[tokio::test]
async fn services_that_do_not_come_up_abort_the_run() {
    let h = Harness::new(FakeFleet::default().with_data(true), 0, 0);
    h.fleet.fail_on("mongo-isup");

    let err = h
        .orchestrator()
        .prepare_data(&RunRequest::for_users(125))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::ServicesDown { stage: "start" }));
    assert!(h.fleet.checks().is_empty());
}

#[tokio::test]
async fn failed_preparation_is_reported() {
    let h = Harness::new(FakeFleet::default().with_data(true), 0, 0);
    h.fleet.fail_on("dbPrep -a 9 -m 0 -p 0 -f 420 -u 125");

    let err = h
        .orchestrator()
        .prepare_data(&RunRequest::for_users(125))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::PrepareFailed { .. }));
}
