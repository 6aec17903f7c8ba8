//! Collision-resistant identifiers for threads, scripts and clones.
//!
//! Identifiers are 20 characters drawn from letters, digits and `_`, always
//! starting with a letter, so they can be embedded verbatim in generated
//! backend source.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Length of a generated identifier.
pub const UID_LENGTH: usize = 20;

const SOUP: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";
const LEADING: usize = 52;

/// Random identifier source.
///
/// # Example
///
/// ```
/// use patchvm::runtime::uid::SafeIdentifierGenerator;
///
/// let mut uid = SafeIdentifierGenerator::with_seed(7);
/// let a = uid.generate();
/// let b = uid.generate_unique(|candidate| candidate == a);
/// assert_ne!(a, b);
/// ```
#[derive(Debug)]
pub struct SafeIdentifierGenerator {
    rng: StdRng,
    collisions: usize,
}

impl Default for SafeIdentifierGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SafeIdentifierGenerator {
    /// Create a generator seeded from the thread-local RNG.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_rng(&mut rand::rng()),
            collisions: 0,
        }
    }

    /// Create a deterministic generator.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            collisions: 0,
        }
    }

    /// Generate one identifier.
    pub fn generate(&mut self) -> String {
        let mut id = String::with_capacity(UID_LENGTH);
        id.push(SOUP[self.rng.random_range(0..LEADING)] as char);
        for _ in 1..UID_LENGTH {
            id.push(SOUP[self.rng.random_range(0..SOUP.len())] as char);
        }
        id
    }

    /// Generate an identifier for which `taken` returns false.
    pub fn generate_unique(
        &mut self,
        mut taken: impl FnMut(&str) -> bool,
    ) -> String {
        loop {
            let id = self.generate();
            if !taken(&id) {
                return id;
            }
            self.collisions += 1;
        }
    }

    /// Number of regenerated candidates so far.
    #[inline]
    pub fn collisions(&self) -> usize {
        self.collisions
    }
}

/// Whether `id` has the shape produced by [`SafeIdentifierGenerator`].
pub fn is_safe_identifier(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == UID_LENGTH
        && bytes[0].is_ascii_alphabetic()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_')
}
