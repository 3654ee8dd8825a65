use rand::{rngs::OsRng, Rng};

/// `length` decimal digits from the OS CSPRNG. Leading zeros are kept.
pub fn generate(length: usize) -> String {
    (0..length)
        .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
        .collect()
}
