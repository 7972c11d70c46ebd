//! Property tests for classification and child-kind filtering.

mod mock_query;

use futures::StreamExt;
use mock_query::MockQuery;
use proptest::prelude::*;
use rtdb_stream::{classify_code, ChildEventKind, ErrorCode, ErrorKind, RxDatabase, VendorError};
use std::sync::Arc;
use std::task::Poll;
use tokio_test::task;

const MAPPED: [(i32, ErrorKind); 6] = [
    (-7, ErrorKind::InvalidToken),
    (-6, ErrorKind::ExpiredToken),
    (-24, ErrorKind::NetworkError),
    (-3, ErrorKind::PermissionDenied),
    (-2, ErrorKind::OperationFailed),
    (-12, ErrorKind::AuthProviderDisabled),
];

proptest! {
    #[test]
    fn unmapped_codes_are_general(code in any::<i32>(), message in ".{0,40}") {
        prop_assume!(MAPPED.iter().all(|(mapped, _)| *mapped != code));
        let error = classify_code(ErrorCode(code), message.clone());
        prop_assert_eq!(error.kind(), ErrorKind::General);
        prop_assert_eq!(error.message(), message.as_str());
    }

    #[test]
    fn mapped_codes_keep_message(index in 0..MAPPED.len(), message in ".{0,40}") {
        let (code, kind) = MAPPED[index];
        let error = classify_code(ErrorCode(code), message.clone());
        prop_assert_eq!(error.kind(), kind);
        prop_assert_eq!(error.message(), message.as_str());
    }

    #[test]
    fn child_added_stream_sees_only_additions(
        moves in proptest::collection::vec(any::<bool>(), 0..30)
    ) {
        let query = MockQuery::new();
        let mut stream = task::spawn(RxDatabase::default().observe_child_added(Arc::clone(&query)));
        prop_assert!(stream.poll_next().is_pending());

        let mut expected = Vec::new();
        for (n, is_move) in moves.iter().enumerate() {
            let key = format!("k{}", n);
            if *is_move {
                query.fire_moved(&key, None);
            } else {
                query.fire_added(&key, None);
                expected.push(key);
            }
        }
        query.cancel_all(VendorError::new(ErrorCode::NETWORK_ERROR, "offline"));

        let mut seen = Vec::new();
        let mut failed = false;
        while let Poll::Ready(Some(item)) = stream.poll_next() {
            match item {
                Ok(event) => {
                    prop_assert_eq!(event.kind(), ChildEventKind::Added);
                    seen.push(event.snapshot().key().unwrap_or_default().to_string());
                }
                Err(error) => {
                    prop_assert_eq!(error.kind(), ErrorKind::NetworkError);
                    failed = true;
                }
            }
        }

        prop_assert_eq!(seen, expected);
        prop_assert!(failed);
        prop_assert_eq!(query.active(), 0);
    }
}

#[tokio::test]
async fn test_filtered_stream_ends_with_upstream() {
    let query = MockQuery::new();
    let mut stream = RxDatabase::default().observe_child_changed(Arc::clone(&query));
    assert!(futures::poll!(stream.next()).is_pending());

    query.fire_added("a", None);
    query.cancel_all(VendorError::new(ErrorCode::UNAVAILABLE, "down"));

    assert_eq!(stream.next().await.unwrap().unwrap_err().kind(), ErrorKind::General);
    assert!(stream.next().await.is_none());
    assert_eq!(query.detach_count(), 1);
}
