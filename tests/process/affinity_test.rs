/*!
 * Affinity Binder Tests
 */

use super::common::{permitted_cores, Sleeper};
use dispatch_kernel::process::affinity;
use dispatch_kernel::{ControllerError, FatalError, RecoverableError};
use nix::unistd::Pid;
use pretty_assertions::assert_eq;
use serial_test::serial;

#[test]
#[serial]
fn test_bind_every_permitted_core() {
    let sleeper = Sleeper::spawn();

    for core in permitted_cores() {
        affinity::bind(sleeper.pid(), core).unwrap();
        assert_eq!(affinity::current_cores(sleeper.pid()).unwrap(), vec![core]);
    }
}

#[test]
#[serial]
fn test_bind_out_of_range_changes_nothing() {
    let sleeper = Sleeper::spawn();
    let before = affinity::current_cores(sleeper.pid()).unwrap();
    let available = affinity::usable_cores();

    for core in [available, available + 1, usize::MAX] {
        let err = affinity::bind(sleeper.pid(), core).unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(
            err,
            ControllerError::Recoverable(RecoverableError::InvalidCore { .. })
        ));
    }

    assert_eq!(affinity::current_cores(sleeper.pid()).unwrap(), before);
}

#[test]
#[serial]
fn test_bind_missing_process_is_fatal() {
    let err = affinity::bind(Pid::from_raw(i32::MAX), permitted_cores()[0]).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        ControllerError::Fatal(FatalError::BindingFailed { .. })
    ));
}
