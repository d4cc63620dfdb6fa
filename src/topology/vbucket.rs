use tracing::warn;

/// Key hash advertised in a bucket's `hashAlgorithm`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// `(crc32_ieee(key) >> 16) & 0x7fff`
    #[default]
    Crc,
}

impl HashAlgorithm {
    /// Unknown names fall back to CRC, the only algorithm clusters publish.
    pub fn parse(name: &str) -> Self {
        if name.is_empty() || name.eq_ignore_ascii_case("crc") {
            return HashAlgorithm::Crc;
        }
        warn!(algorithm = name, "unknown hash algorithm, falling back to CRC");
        HashAlgorithm::Crc
    }

    pub fn hash(
        &self,
        key: &[u8],
    ) -> u32 {
        match self {
            HashAlgorithm::Crc => (crc32fast::hash(key) >> 16) & 0x7fff,
        }
    }
}

/// Vbucket owning `key` in a map of `count` entries; 0 for an empty map
pub fn vbucket_id(
    algorithm: HashAlgorithm,
    key: &[u8],
    count: usize,
) -> u16 {
    if count == 0 {
        return 0;
    }
    (algorithm.hash(key) as usize % count) as u16
}

/// Longest common suffix of `names`, on char boundaries
pub fn common_suffix<S: AsRef<str>>(names: &[S]) -> String {
    let Some((first, rest)) = names.split_first() else {
        return String::new();
    };
    let mut suffix = first.as_ref();
    for name in rest {
        let name = name.as_ref();
        let shared = suffix
            .chars()
            .rev()
            .zip(name.chars().rev())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum::<usize>();
        suffix = &suffix[suffix.len() - shared..];
        if suffix.is_empty() {
            break;
        }
    }
    suffix.to_string()
}
