use fanin_core::key::{PubSubKey, ReqRepKey, pub_sub_key, req_rep_key};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::collections::{HashMap, HashSet};

const ALPHABET: &[u8] = b"ab_-0.";

fn random_chunk(rng: &mut StdRng) -> String {
    let len = rng.random_range(1..=3);
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

fn random_tail(rng: &mut StdRng) -> String {
    let chunks = rng.random_range(1..=3);
    (0..chunks)
        .map(|_| random_chunk(rng))
        .collect::<Vec<_>>()
        .join("/")
}

fn random_pub_sub(rng: &mut StdRng) -> PubSubKey {
    PubSubKey::new(
        random_chunk(rng),
        random_chunk(rng),
        random_chunk(rng),
        random_tail(rng),
    )
}

#[test]
fn test_pub_sub_construction_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let tuple = random_pub_sub(&mut rng);
        assert_eq!(tuple.to_key().unwrap(), tuple.clone().to_key().unwrap());
    }
}

#[test]
fn test_pub_sub_construction_is_injective() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut seen: HashMap<String, PubSubKey> = HashMap::new();

    for _ in 0..5000 {
        let tuple = random_pub_sub(&mut rng);
        let key = tuple.to_key().unwrap();

        if let Some(previous) = seen.insert(key.to_string(), tuple.clone()) {
            assert_eq!(previous, tuple, "distinct tuples collided on '{}'", key);
        }
        assert_eq!(PubSubKey::parse(&key).as_ref(), Some(&tuple));
    }
}

#[test]
fn test_req_rep_construction_is_injective() {
    let mut rng = StdRng::seed_from_u64(1234);
    let mut seen: HashMap<String, ReqRepKey> = HashMap::new();

    for _ in 0..5000 {
        let tuple = ReqRepKey::new(
            random_chunk(&mut rng),
            random_chunk(&mut rng),
            random_chunk(&mut rng),
            random_tail(&mut rng),
        );
        let key = tuple.to_key().unwrap();

        if let Some(previous) = seen.insert(key.to_string(), tuple.clone()) {
            assert_eq!(previous, tuple, "distinct tuples collided on '{}'", key);
        }
        assert_eq!(ReqRepKey::parse(&key).as_ref(), Some(&tuple));
    }
}

#[test]
fn test_pub_sub_and_req_rep_never_collide() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut pub_sub = HashSet::new();
    let mut req_rep = HashSet::new();

    for _ in 0..1000 {
        let (a, b, c, d) = (
            random_chunk(&mut rng),
            random_chunk(&mut rng),
            random_chunk(&mut rng),
            random_tail(&mut rng),
        );
        pub_sub.insert(pub_sub_key(&a, &b, &c, &d).unwrap());
        req_rep.insert(req_rep_key(&a, &b, &c, &d).unwrap());
    }

    assert!(pub_sub.is_disjoint(&req_rep));
}

#[test]
fn test_ambiguous_splits_are_rejected() {
    // Both would render as "r/@v0/e/pubsub/s/x/y" if slashes were allowed
    // outside the source id.
    assert!(pub_sub_key("r", "e", "s/x", "y").is_err());
    assert!(pub_sub_key("r", "e", "s", "x/y").is_ok());
}
