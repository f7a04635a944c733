//! Hash Ring Tests
//!
//! ## Test Scopes
//! - **Lookup**: exact "first point at or after the hash, else wrap" semantics.
//! - **Churn**: adding or removing a member only moves that member's keys.
//! - **Distribution**: CRC-32 with virtual replicas spreads keys across members.

#[cfg(test)]
mod tests {
    use crate::error::CacheError;
    use crate::ring::{HashFn, HashRing};
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Interprets the hashed bytes as a decimal number, which makes ring
    /// positions readable: replica `i` of member `"6"` lands on point `i6`.
    fn numeric_hash() -> HashFn {
        Arc::new(|data: &[u8]| {
            std::str::from_utf8(data)
                .unwrap()
                .parse::<u32>()
                .unwrap()
        })
    }

    // ============================================================
    // LOOKUP TESTS
    // ============================================================

    #[test]
    fn test_empty_ring_returns_none() {
        let ring = HashRing::new(50);

        assert!(ring.is_empty());
        assert_eq!(ring.get("anything"), None);
    }

    #[test]
    fn test_lookup_picks_first_point_at_or_after_hash() {
        let ring = HashRing::with_hasher(3, numeric_hash());

        // Points: 2, 4, 6, 12, 14, 16, 22, 24, 26
        ring.add(["6", "4", "2"]);

        let cases = [("2", "2"), ("11", "2"), ("23", "4"), ("27", "2")];
        for (key, owner) in cases {
            assert_eq!(ring.get(key).as_deref(), Some(owner), "key {}", key);
        }

        // Points 8, 18, 28 take over everything in (26, 28].
        ring.add(["8"]);
        assert_eq!(ring.get("27").as_deref(), Some("8"));
        assert_eq!(ring.get("23").as_deref(), Some("4"));
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let first = HashRing::new(50);
        let second = HashRing::new(50);
        first.add(["http://a:1", "http://b:2", "http://c:3"]);
        second.add(["http://c:3", "http://a:1", "http://b:2"]);

        for i in 0..500 {
            let key = format!("key-{}", i);
            assert_eq!(first.get(&key), first.get(&key));
            assert_eq!(first.get(&key), second.get(&key), "insertion order must not matter");
        }
    }

    // ============================================================
    // CHURN TESTS
    // ============================================================

    #[test]
    fn test_delete_moves_only_removed_members_keys_to_successor() {
        let ring = HashRing::with_hasher(3, numeric_hash());
        ring.add(["6", "4", "2"]);

        let keys: Vec<String> = (0..30).map(|k| k.to_string()).collect();
        let before: HashMap<String, String> = keys
            .iter()
            .map(|k| (k.clone(), ring.get(k).unwrap()))
            .collect();

        ring.delete("4").unwrap();

        for key in &keys {
            let after = ring.get(key).unwrap();
            if before[key] == "4" {
                assert_ne!(after, "4");
            } else {
                assert_eq!(after, before[key], "key {} must not move", key);
            }
        }

        // 23 used to land on point 24 ("4"); its successor is 26 ("6").
        assert_eq!(ring.get("23").as_deref(), Some("6"));
        // 3 used to land on point 4; next is 6.
        assert_eq!(ring.get("3").as_deref(), Some("6"));
    }

    #[test]
    fn test_add_only_claims_keys_for_new_member() {
        let ring = HashRing::new(50);
        ring.add(["node-a", "node-b", "node-c"]);

        let keys: Vec<String> = (0..2000).map(|i| format!("user:{}", i)).collect();
        let before: Vec<String> = keys.iter().map(|k| ring.get(k).unwrap()).collect();

        ring.add(["node-d"]);

        for (key, old_owner) in keys.iter().zip(before) {
            let new_owner = ring.get(key).unwrap();
            assert!(
                new_owner == old_owner || new_owner == "node-d",
                "{} moved from {} to {}",
                key,
                old_owner,
                new_owner
            );
        }
    }

    #[test]
    fn test_delete_validation() {
        let ring = HashRing::new(1);
        ring.add(["only"]);

        assert!(matches!(ring.delete(""), Err(CacheError::InvalidArgument(_))));
        assert!(ring.delete("missing").is_ok());
        assert_eq!(ring.members(), vec!["only".to_string()]);

        ring.delete("only").unwrap();
        assert!(ring.is_empty());
        assert_eq!(ring.get("k"), None);
    }

    // ============================================================
    // DISTRIBUTION / CONCURRENCY
    // ============================================================

    #[test]
    fn test_virtual_replicas_spread_keys() {
        let ring = HashRing::new(50);
        ring.add(["http://127.0.0.1:8001", "http://127.0.0.1:8002", "http://127.0.0.1:8003"]);
        assert_eq!(ring.len(), 3);

        let mut counts: HashMap<String, usize> = HashMap::new();
        for i in 0..9000 {
            *counts.entry(ring.get(&format!("book_{}", i)).unwrap()).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        for (member, count) in counts {
            assert!(count > 1000, "{} only owns {} keys", member, count);
        }
    }

    #[test]
    fn test_concurrent_reads_during_membership_changes() {
        let ring = Arc::new(HashRing::new(10));
        ring.add(["base"]);

        let writer = {
            let ring = ring.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    let name = format!("member-{}", i);
                    ring.add([name.as_str()]);
                    ring.delete(&name).unwrap();
                }
            })
        };

        for i in 0..2000 {
            assert!(ring.get(&format!("k{}", i)).is_some());
        }

        writer.join().unwrap();
        assert_eq!(ring.members(), vec!["base".to_string()]);
    }
}
