use std::collections::BTreeMap;

/// Key/value source for configuration: dotenv entries first, then (unless
/// isolated) the process environment.
#[derive(Clone)]
pub struct Env {
    pub dotenv: BTreeMap<String, String>,
    inherit_process: bool,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.dotenv.keys().map(|key| key.as_str()).collect();
        f.debug_struct("Env")
            .field("dotenv_keys", &keys)
            .field("inherit_process", &self.inherit_process)
            .finish()
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::process()
    }
}

impl Env {
    pub fn process() -> Self {
        Self {
            dotenv: BTreeMap::new(),
            inherit_process: true,
        }
    }

    /// Dotenv entries layered over the process environment.
    pub fn parse_dotenv(contents: &str) -> Self {
        Self {
            dotenv: parse_dotenv(contents),
            inherit_process: true,
        }
    }

    /// Only the given pairs are visible; the process environment is ignored.
    pub fn isolated<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            dotenv: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            inherit_process: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.dotenv.get(key) {
            return Some(value.clone());
        }
        if !self.inherit_process {
            return None;
        }
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    pub fn first_of<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Option<String> {
        keys.into_iter().find_map(|key| self.get(key))
    }
}

pub fn parse_dotenv(contents: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::<String, String>::new();

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line).trim();
        let Some((raw_key, raw_value)) = line.split_once('=') else {
            continue;
        };
        let key = raw_key.trim();
        if key.is_empty() {
            continue;
        }

        let raw_value = raw_value.trim();
        let value = raw_value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| raw_value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(raw_value);

        if value.trim().is_empty() {
            continue;
        }

        out.insert(key.to_string(), value.to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_handles_exports_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# replicate\nexport REPLICATE_API_KEY=\"r8_abc\"\nPORT='8080'\nEMPTY=\nnot a pair\n",
        );
        assert_eq!(parsed.get("REPLICATE_API_KEY").map(String::as_str), Some("r8_abc"));
        assert_eq!(parsed.get("PORT").map(String::as_str), Some("8080"));
        assert!(!parsed.contains_key("EMPTY"));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn isolated_env_ignores_process_environment() {
        let env = Env::isolated([("A", "1")]);
        assert_eq!(env.get("A").as_deref(), Some("1"));
        assert_eq!(env.get("PATH"), None);
        assert_eq!(env.first_of(["MISSING", "A"]).as_deref(), Some("1"));
    }

    #[test]
    fn debug_lists_keys_but_not_values() {
        let env = Env::isolated([("REPLICATE_API_KEY", "r8_secret")]);
        let rendered = format!("{env:?}");
        assert!(rendered.contains("REPLICATE_API_KEY"));
        assert!(!rendered.contains("r8_secret"));
    }
}
