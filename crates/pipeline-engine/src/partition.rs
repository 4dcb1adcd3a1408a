use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// `hash(domain, key) % partition_count` — the sharding function the whole
/// concurrency model is built on (§5).
pub fn partition_of(domain: &str, key: &str, partition_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    domain.hash(&mut hasher);
    key.hash(&mut hasher);
    (hasher.finish() as usize) % partition_count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_domain_and_key_always_land_on_the_same_partition() {
        let a = partition_of("Order", "o1", 8);
        let b = partition_of("Order", "o1", 8);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_partition_count_does_not_panic() {
        assert_eq!(partition_of("Order", "o1", 0), 0);
    }

    #[test]
    fn different_keys_can_land_on_different_partitions() {
        let partitions: std::collections::HashSet<usize> =
            (0..32).map(|i| partition_of("Order", &format!("o{i}"), 8)).collect();
        assert!(partitions.len() > 1, "expected keys to spread across more than one partition");
    }
}
