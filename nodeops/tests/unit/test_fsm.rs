//! Update FSM unit tests

use nodeops::errors::OpsError;
use nodeops::update::fsm::{UpdateEvent, UpdateFsm, UpdateState};

#[test]
fn test_fsm_initial_state() {
    let fsm = UpdateFsm::new();
    assert_eq!(fsm.state(), UpdateState::Idle);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.history(), &[UpdateState::Idle]);
}

#[test]
fn test_fsm_update_success_flow() {
    let mut fsm = UpdateFsm::new();

    for event in [
        UpdateEvent::Check,
        UpdateEvent::UpdateAvailable,
        UpdateEvent::Confirmed,
        UpdateEvent::BackupCompleted,
        UpdateEvent::BuildCompleted,
        UpdateEvent::Redeployed,
        UpdateEvent::Verified,
    ] {
        fsm.process(event).unwrap();
    }

    assert_eq!(fsm.state(), UpdateState::Done);
    assert_eq!(
        fsm.history(),
        &[
            UpdateState::Idle,
            UpdateState::CheckingVersion,
            UpdateState::AwaitingConfirmation,
            UpdateState::BackingUp,
            UpdateState::Building,
            UpdateState::Redeploying,
            UpdateState::Verifying,
            UpdateState::Done,
        ]
    );

    // Done is an entry point for the next run
    fsm.process(UpdateEvent::Reset).unwrap();
    fsm.process(UpdateEvent::Check).unwrap();
    assert_eq!(fsm.state(), UpdateState::CheckingVersion);
}

#[test]
fn test_fsm_already_latest_skips_to_done() {
    let mut fsm = UpdateFsm::new();
    fsm.process(UpdateEvent::Check).unwrap();
    fsm.process(UpdateEvent::UpToDate).unwrap();
    assert_eq!(fsm.state(), UpdateState::Done);
    assert!(!fsm.history().contains(&UpdateState::AwaitingConfirmation));
}

#[test]
fn test_fsm_declined_returns_to_idle() {
    let mut fsm = UpdateFsm::new();
    fsm.process(UpdateEvent::Check).unwrap();
    fsm.process(UpdateEvent::UpdateAvailable).unwrap();
    fsm.process(UpdateEvent::Declined).unwrap();
    assert_eq!(fsm.state(), UpdateState::Idle);
}

#[test]
fn test_fsm_build_failure_does_not_roll_back() {
    let mut fsm = UpdateFsm::new();
    fsm.process(UpdateEvent::Check).unwrap();
    fsm.process(UpdateEvent::UpdateAvailable).unwrap();
    fsm.process(UpdateEvent::Confirmed).unwrap();
    fsm.process(UpdateEvent::BackupCompleted).unwrap();
    fsm.process(UpdateEvent::StepFailed("image build failed".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), UpdateState::Idle);
    assert_eq!(fsm.error(), Some("image build failed"));
    assert!(!fsm.history().contains(&UpdateState::RollingBack));
}

#[test]
fn test_fsm_backup_failure_stops_before_build() {
    let mut fsm = UpdateFsm::new();
    fsm.process(UpdateEvent::Check).unwrap();
    fsm.process(UpdateEvent::UpdateAvailable).unwrap();
    fsm.process(UpdateEvent::Confirmed).unwrap();
    fsm.process(UpdateEvent::StepFailed("no config".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), UpdateState::Idle);
    assert!(!fsm.history().contains(&UpdateState::Building));
}

#[test]
fn test_fsm_verify_failure_rolls_back() {
    let mut fsm = UpdateFsm::new();
    for event in [
        UpdateEvent::Check,
        UpdateEvent::UpdateAvailable,
        UpdateEvent::Confirmed,
        UpdateEvent::BackupCompleted,
        UpdateEvent::BuildCompleted,
        UpdateEvent::Redeployed,
    ] {
        fsm.process(event).unwrap();
    }

    fsm.process(UpdateEvent::StepFailed("version mismatch".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), UpdateState::RollingBack);

    fsm.process(UpdateEvent::RolledBack).unwrap();
    assert_eq!(fsm.state(), UpdateState::Idle);
}

#[test]
fn test_fsm_redeploy_failure_rolls_back() {
    let mut fsm = UpdateFsm::new();
    for event in [
        UpdateEvent::Check,
        UpdateEvent::UpdateAvailable,
        UpdateEvent::Confirmed,
        UpdateEvent::BackupCompleted,
        UpdateEvent::BuildCompleted,
    ] {
        fsm.process(event).unwrap();
    }
    fsm.process(UpdateEvent::StepFailed("compose up failed".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), UpdateState::RollingBack);
}

#[test]
fn test_fsm_manual_rollback() {
    let mut fsm = UpdateFsm::new();
    fsm.process(UpdateEvent::Rollback).unwrap();
    assert_eq!(fsm.state(), UpdateState::RollingBack);
    fsm.process(UpdateEvent::StepFailed("build failed".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), UpdateState::Idle);
    assert_eq!(fsm.error(), Some("build failed"));
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = UpdateFsm::new();

    // Cannot confirm before a check
    assert!(matches!(
        fsm.process(UpdateEvent::Confirmed),
        Err(OpsError::TransitionError(_))
    ));

    // Cannot skip the backup
    fsm.process(UpdateEvent::Check).unwrap();
    fsm.process(UpdateEvent::UpdateAvailable).unwrap();
    assert!(fsm.process(UpdateEvent::BuildCompleted).is_err());
    assert_eq!(fsm.state(), UpdateState::AwaitingConfirmation);

    // A failed check never rolls back
    let mut fsm = UpdateFsm::new();
    fsm.process(UpdateEvent::Check).unwrap();
    assert!(fsm.process(UpdateEvent::RolledBack).is_err());
}
