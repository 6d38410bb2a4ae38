// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Barrier};

use rstest::rstest;

use super::SessionManager;
use crate::fixtures::*;
use crate::remote::RemoteSession;
use crate::Error;

fn manager(remote: &MemoryRemote) -> SessionManager<MemoryRemote> {
    SessionManager::new(remote.clone(), memory_context("/"))
}

#[rstest]
fn test_not_connected_until_connect(remote: MemoryRemote) {
    init_logging();
    let sessions = manager(&remote);
    assert!(matches!(
        sessions.current_session(),
        Err(Error::NotConnected)
    ));

    sessions.connect().expect("connect should succeed");
    let session = sessions.current_session().expect("session after connect");
    session.stat("/").expect("root always exists");
    assert_eq!(remote.connects(), 1);
}

#[rstest]
fn test_connect_failure_is_returned(remote: MemoryRemote) {
    remote.refuse_connects(1);
    let sessions = manager(&remote);
    let err = sessions.connect().unwrap_err();
    assert!(err.is_connection_lost(), "got {err:?}");
    assert!(sessions.current_session().is_err());
}

#[rstest]
fn test_reconnect_when_healthy_is_noop(remote: MemoryRemote) {
    let sessions = manager(&remote);
    sessions.connect().unwrap();
    assert!(sessions.reconnect());
    assert_eq!(remote.connects(), 1, "a healthy session is never replaced");
    assert_eq!(sessions.retry_count(), 0);
}

#[rstest]
fn test_reconnect_after_mark_faulted(remote: MemoryRemote) {
    let sessions = manager(&remote);
    sessions.connect().unwrap();
    let stale = sessions.current_session().unwrap();

    sessions.mark_faulted();
    sessions.mark_faulted();
    assert!(sessions.is_faulted());
    remote.refuse_connects(1);
    assert!(!sessions.reconnect());
    let current = sessions.current_session().expect("stale session stays installed");
    assert!(Arc::ptr_eq(&current, &stale));

    assert!(sessions.reconnect());
    assert!(sessions.reconnect());
    assert!(!sessions.is_faulted());
    assert_eq!(sessions.retry_count(), 2);
    assert_eq!(remote.connects(), 3);
    assert_eq!(remote.disconnects(), 1, "the stale session is torn down");
}

#[rstest]
fn test_repair_of_replaced_session_is_noop(remote: MemoryRemote) {
    let sessions = manager(&remote);
    sessions.connect().unwrap();
    let old = sessions.current_session().unwrap();
    sessions.connect().unwrap();

    assert!(sessions.repair(Some(&old)));
    assert!(sessions.repair(None), "a session is already installed");
    assert_eq!(remote.connects(), 2, "a newer session is never replaced");
    assert_eq!(sessions.retry_count(), 0);
}

#[rstest]
fn test_repair_replaces_faulted_session(remote: MemoryRemote) {
    init_logging();
    let sessions = manager(&remote);
    sessions.connect().unwrap();
    remote.sever();
    let stale = sessions.current_session().unwrap();
    assert!(stale.stat("/").unwrap_err().is_connection_lost());

    assert!(sessions.repair(Some(&stale)));
    assert!(sessions.repair(Some(&stale)));
    assert!(!sessions.is_faulted());
    assert_eq!(sessions.retry_count(), 1);
    assert_eq!(remote.connects(), 2);
    assert_eq!(remote.disconnects(), 1, "the stale session is torn down");

    let fresh = sessions.current_session().unwrap();
    fresh.stat("/").expect("new session should work");
}

#[rstest]
fn test_failed_repair_keeps_stale_session(remote: MemoryRemote) {
    let sessions = manager(&remote);
    sessions.connect().unwrap();
    let stale = sessions.current_session().unwrap();
    remote.refuse_connects(1);

    assert!(!sessions.repair(Some(&stale)));
    assert!(sessions.is_faulted());
    let current = sessions.current_session().expect("stale session stays installed");
    assert!(Arc::ptr_eq(&current, &stale));
    assert_eq!(remote.disconnects(), 0);

    assert!(sessions.repair(Some(&stale)), "the next attempt is allowed through");
    assert!(!sessions.is_faulted());
    assert_eq!(sessions.retry_count(), 2, "retries are never reset");
}

#[rstest]
fn test_repair_without_session_connects(remote: MemoryRemote) {
    let sessions = manager(&remote);
    assert!(sessions.repair(None));
    assert!(sessions.current_session().is_ok());
    assert_eq!(sessions.retry_count(), 1);
}

#[rstest]
fn test_concurrent_repair_is_single_flight(remote: MemoryRemote) {
    init_logging();
    const CALLERS: usize = 16;

    let sessions = manager(&remote);
    sessions.connect().unwrap();
    remote.sever();
    let stale = sessions.current_session().unwrap();

    let barrier = Barrier::new(CALLERS);
    let results: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    sessions.repair(Some(&stale))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("caller should not panic"))
            .collect()
    });

    assert!(results.into_iter().all(|ok| ok));
    assert_eq!(remote.connects(), 2, "exactly one reconnect should happen");
    assert_eq!(sessions.retry_count(), 1);
    assert!(!sessions.is_faulted());
}

#[rstest]
fn test_disconnect_removes_session(remote: MemoryRemote) {
    let sessions = manager(&remote);
    sessions.disconnect().expect("disconnecting nothing is fine");
    assert_eq!(remote.disconnects(), 0);

    sessions.connect().unwrap();
    sessions.disconnect().unwrap();
    assert_eq!(remote.disconnects(), 1);
    assert!(matches!(
        sessions.current_session(),
        Err(Error::NotConnected)
    ));
}
