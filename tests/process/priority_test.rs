/*!
 * Priority Controller Tests
 */

use super::common::Sleeper;
use dispatch_kernel::process::priority;
use dispatch_kernel::{PriorityClass, RecoverableError};
use serial_test::serial;

#[test]
#[serial]
fn test_demote_to_idle() {
    let sleeper = Sleeper::spawn();

    priority::set_idle(sleeper.pid()).unwrap();
    assert_eq!(
        priority::current_class(sleeper.pid()).unwrap(),
        Some(PriorityClass::Idle)
    );
}

#[test]
#[serial]
fn test_restore_to_normal_is_reported() {
    let sleeper = Sleeper::spawn();
    priority::set_idle(sleeper.pid()).unwrap();

    // Unprivileged callers may not leave the idle class
    match priority::set_normal(sleeper.pid()) {
        Ok(()) => assert_eq!(
            priority::current_class(sleeper.pid()).unwrap(),
            Some(PriorityClass::Normal)
        ),
        Err(err) => {
            assert!(matches!(
                err,
                RecoverableError::PriorityChangeFailed {
                    class: PriorityClass::Normal,
                    ..
                }
            ));
            assert_eq!(
                priority::current_class(sleeper.pid()).unwrap(),
                Some(PriorityClass::Idle)
            );
        }
    }
}
