mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_overdraft_is_rejected_and_balance_unchanged() {
    let file = common::write_events(&[
        r#"{"op":"initiate","owner":"client:1","amount":200,"phone":"+254700000001"}"#,
        r#"{"op":"callback","payload":{"referenceId":"SBX-1","status":"Success","amount":200,"currency":"KES"}}"#,
        r#"{"op":"debit","owner":"client:1","amount":300,"kind":"job_payment"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("fundipay"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains(
            "Insufficient funds: available 200, requested 300",
        ))
        .stdout(predicate::str::contains("client:1,200,KES"));
}

#[test]
fn test_mixed_debit_kinds_apply_in_order() {
    let file = common::write_events(&[
        r#"{"op":"initiate","owner":"fundi:5","amount":50000,"phone":"+254700000005"}"#,
        r#"{"op":"callback","payload":{"referenceId":"SBX-1","status":"Success","amount":50000,"currency":"KES"}}"#,
        r#"{"op":"debit","owner":"fundi:5","amount":20000,"kind":"job_payment"}"#,
        r#"{"op":"debit","owner":"fundi:5","amount":5000,"kind":"withdrawal"}"#,
        r#"{"op":"debit","owner":"fundi:5","amount":1000,"kind":"subscription_charge"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("fundipay"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("fundi:5,24000,KES"));
}

#[test]
fn test_debit_from_untouched_wallet_is_rejected() {
    let file = common::write_events(&[
        r#"{"op":"debit","owner":"client:9","amount":100,"kind":"withdrawal"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("fundipay"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Insufficient funds"));
}
