use branch_recon::flags::{FlagStore, Flags};
use branch_recon::loader::{load_csv, merge_due_lists};
use branch_recon::tranche::{first_tranche_view, flags_from_view, ChequeTrancheRecord};
use branch_recon::{AppState, Config};
use chrono::NaiveDate;
use std::fs;
use tempfile::TempDir;

fn scratch() -> TempDir {
    tempfile::tempdir().unwrap()
}

#[test]
fn saved_flags_survive_a_reload() {
    let tmp = scratch();
    let dir = tmp.path();
    let cheque = dir.join("cheque.csv");
    fs::write(
        &cheque,
        "branch_id,date_disbursed,sanction_no,tranch_no,member_name,member_cnic\n\
         B1,2024-01-01,S1,1,Ali,111\n\
         B1,2024-04-20,S2,1,Sara,222\n",
    )
    .unwrap();
    let store_path = dir.join("cheque_flags.csv");
    let as_of = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

    let records = ChequeTrancheRecord::from_table(&load_csv(&cheque, 0).unwrap()).unwrap();
    let mut view = first_tranche_view(&records, as_of, &FlagStore::load(&store_path).unwrap());
    view[0].set_flags(Flags {
        house_complete: "Yes".into(),
        shifted: String::new(),
        design: "Type A".into(),
    });
    flags_from_view(&view).save(&store_path).unwrap();

    let reloaded = first_tranche_view(&records, as_of, &FlagStore::load(&store_path).unwrap());
    assert_eq!(reloaded[0].house_complete, "Yes");
    assert_eq!(reloaded[0].design, "Type A");
    assert_eq!(reloaded[0].risk_level.label(), "No Risk");
    assert_eq!(reloaded[1].house_complete, "");
}

#[test]
fn recovery_cache_backs_a_fresh_session() {
    let tmp = scratch();
    let dir = tmp.path();
    let upload = dir.join("upload.csv");
    fs::write(&upload, "Sanction No,branch_id,recovery_date,amount\nA1,B1,2024-05-02,100\n").unwrap();
    let config = Config {
        recovery_cache: dir.join("data").join("recovery.csv"),
        session_file: dir.join("session.json"),
        ..Config::default()
    };

    let state = AppState::new()
        .with_recovery_upload(load_csv(&upload, 0).unwrap(), &config.recovery_cache)
        .unwrap();
    state.save(&config.session_file).unwrap();

    let restored = AppState::load(&config.session_file).unwrap();
    assert_eq!(restored.recovery, state.recovery);

    let from_cache = AppState::new()
        .with_cached_recovery(&config.recovery_cache)
        .unwrap();
    let listings = from_cache.recovery_listings().unwrap();
    assert_eq!(listings["B1"].total_amount, 100.0);
}

#[test]
fn due_lists_merge_across_header_spellings() {
    let tmp = scratch();
    let dir = tmp.path();
    let a = dir.join("a.csv");
    let b = dir.join("b.csv");
    let c = dir.join("c.csv");
    fs::write(&a, "Due List,\nBranch 1021,\nSanction No,Amount\n1021-001,500\n").unwrap();
    fs::write(&b, "Due List,\nBranch 1022,\nSaction No,Amount\n1022-004,700\n").unwrap();
    fs::write(&c, "Due List,\n,\nMember,Amount\nOmar,1\n").unwrap();

    let outcome = merge_due_lists(&[a, b, c.clone()]).unwrap();
    assert_eq!(outcome.merged_files.len(), 2);
    assert_eq!(outcome.missing_sanction_files, vec![c]);
    assert_eq!(
        outcome.table.column_values("sanctionno"),
        vec!["1021-001", "1022-004"]
    );
    assert_eq!(outcome.table.column_values("amount"), vec!["500", "700"]);
}
