use proptest::prelude::*;
use std::sync::Arc;

use parley_engine::history::codec::encode;
use parley_engine::history::{HistoryStore, MemoryBackend, RecordBackend, RecordId, StoredRecord};
use sdk::{Turn, TurnPayload};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Longest suffix that fits the budget, or the newest pair alone
fn expected_survivors(pairs: &[(usize, usize)], budget: usize) -> Vec<(usize, usize)> {
    let mut total = 0;
    let mut start = pairs.len();
    while start > 0 {
        let (u, a) = pairs[start - 1];
        if total + u + a > budget {
            break;
        }
        total += u + a;
        start -= 1;
    }
    if start == pairs.len() {
        start = pairs.len() - 1;
    }
    pairs[start..].to_vec()
}

proptest! {
    #[test]
    fn test_retention_keeps_newest_fitting_suffix(
        pairs in prop::collection::vec((0usize..20, 0usize..20), 1..25),
        budget in 1usize..80,
    ) {
        let rt = runtime();
        let turns = rt.block_on(async {
            let store = HistoryStore::new(Arc::new(MemoryBackend::new()), budget);
            for (i, (u, a)) in pairs.iter().enumerate() {
                store
                    .append_with_id("u", &i.to_string(), TurnPayload::pair("x".repeat(*u), "y".repeat(*a)))
                    .await
                    .unwrap();
            }
            store.read("u").await.unwrap()
        });

        let expected: Vec<Turn> = expected_survivors(&pairs, budget)
            .into_iter()
            .flat_map(|(u, a)| vec![Turn::user("x".repeat(u)), Turn::assistant("y".repeat(a))])
            .collect();

        prop_assert_eq!(turns, expected);
    }

    #[test]
    fn test_read_order_follows_created_at_then_id(
        records in prop::collection::btree_map(0u32..1000, 0i64..5, 1..20),
    ) {
        let rt = runtime();
        let contents = rt.block_on(async {
            let backend = Arc::new(MemoryBackend::new());
            for (id, created_at) in records.iter().rev() {
                let bytes = encode(&TurnPayload::single("user", id.to_string())).unwrap();
                let record = StoredRecord::new(RecordId::new(id.to_string()).unwrap(), *created_at, bytes);
                backend.insert("u", &record).await.unwrap();
            }

            let store = HistoryStore::new(backend, usize::MAX);
            store
                .read("u")
                .await
                .unwrap()
                .into_iter()
                .map(|t| t.content)
                .collect::<Vec<_>>()
        });

        let mut expected: Vec<(i64, u32)> = records.iter().map(|(id, at)| (*at, *id)).collect();
        expected.sort();
        let expected: Vec<String> = expected.into_iter().map(|(_, id)| id.to_string()).collect();

        prop_assert_eq!(contents, expected);
    }
}
