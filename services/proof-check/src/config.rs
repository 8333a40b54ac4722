use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use stateproof::{CollectionName, Hash32, HashBackend};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bundle_path: PathBuf,
    pub trusted_app_hash: Hash32,
    pub collection: CollectionName,
    pub keys: Vec<Vec<u8>>,
    pub hash_backend: HashBackend,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key).with_context(|| format!("Missing required env var: {key}"))
        };

        let bundle_path = PathBuf::from(get("PROOF_BUNDLE_PATH")?);
        let trusted_app_hash = parse_hash(&get("PROOF_TRUSTED_APP_HASH")?)
            .context("PROOF_TRUSTED_APP_HASH must be 64 hex chars")?;

        let collection = get("PROOF_COLLECTION")?
            .parse::<CollectionName>()
            .map_err(anyhow::Error::msg)?;

        let keys = parse_keys(&get("PROOF_KEYS")?)
            .context("PROOF_KEYS must be comma-separated hex")?;
        if keys.is_empty() {
            bail!("PROOF_KEYS must name at least one key");
        }

        let hash_backend = match lookup("PROOF_HASH_BACKEND") {
            Some(v) => v.parse::<HashBackend>().map_err(anyhow::Error::msg)?,
            None => HashBackend::default(),
        };

        Ok(Self {
            bundle_path,
            trusted_app_hash,
            collection,
            keys,
            hash_backend,
        })
    }
}

fn parse_hash(s: &str) -> Result<Hash32> {
    let bytes = hex::decode(s.trim())?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected 32 bytes, got {len}"))
}

fn parse_keys(s: &str) -> Result<Vec<Vec<u8>>> {
    s.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| hex::decode(k).with_context(|| format!("bad key: {k}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("PROOF_BUNDLE_PATH", "bundle.json"),
            (
                "PROOF_TRUSTED_APP_HASH",
                "11111111111111111111111111111111111111111111111111111111111111ff",
            ),
            ("PROOF_COLLECTION", "documents"),
            ("PROOF_KEYS", "6e616d65, 00ff"),
        ]
    }

    #[test]
    fn test_from_vars() {
        let cfg = config(&base()).unwrap();
        assert_eq!(cfg.collection, CollectionName::Documents);
        assert_eq!(cfg.keys, vec![b"name".to_vec(), vec![0x00, 0xff]]);
        assert_eq!(cfg.trusted_app_hash[31], 0xff);
        assert_eq!(cfg.hash_backend, HashBackend::Blake3);
    }

    #[test]
    fn test_missing_var_is_named() {
        let vars: Vec<_> = base()
            .into_iter()
            .filter(|(k, _)| *k != "PROOF_KEYS")
            .collect();
        let err = config(&vars).unwrap_err();
        assert!(err.to_string().contains("PROOF_KEYS"));
    }

    #[test]
    fn test_rejects_short_app_hash() {
        let mut vars = base();
        vars[1] = ("PROOF_TRUSTED_APP_HASH", "abcd");
        assert!(config(&vars).is_err());
    }

    #[test]
    fn test_backend_override() {
        let mut vars = base();
        vars.push(("PROOF_HASH_BACKEND", "sha256"));
        assert_eq!(config(&vars).unwrap().hash_backend, HashBackend::Sha256);

        vars.pop();
        vars.push(("PROOF_HASH_BACKEND", "md5"));
        assert!(config(&vars).is_err());
    }
}
