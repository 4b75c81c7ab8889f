//! Rendering [`Locks`] as lock file text.
//!
//! The output depends only on the value being encoded: providers appear in
//! address order, platforms in platform order, and hash lists in the order
//! they were recorded.

use std::fmt::Write as _;

use super::{Locks, ProviderLock};
use crate::constants::LOCK_FILE_MAINTAINER;

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Encode `locks` as a complete lock file.
#[must_use]
pub fn encode_locks(locks: &Locks) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# This file is maintained automatically by {}.", quote(LOCK_FILE_MAINTAINER));
    out.push_str("# Manual edits may be lost in future updates.\n");

    for lock in locks.all_providers() {
        out.push('\n');
        encode_provider(&mut out, lock);
    }
    out
}

fn encode_provider(out: &mut String, lock: &ProviderLock) {
    let _ = writeln!(out, "provider {} {{", quote(&lock.provider().to_string()));

    let mut attrs = vec![("version", lock.version().to_string())];
    if let Some(constraints) = lock.version_constraints() {
        attrs.push(("constraints", constraints.to_string()));
    }
    let width = attrs.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, value) in &attrs {
        let _ = writeln!(out, "  {name:<width$} = {}", quote(value));
    }

    if let Some(hashes) = lock.hashes() {
        out.push('\n');
        out.push_str("  hashes {\n");
        for (platform, list) in hashes {
            if list.is_empty() {
                let _ = writeln!(out, "    {platform} = []");
                continue;
            }
            let _ = writeln!(out, "    {platform} = [");
            for hash in list {
                let _ = writeln!(out, "      {},", quote(hash.as_str()));
            }
            out.push_str("    ]\n");
        }
        out.push_str("  }\n");
    }

    out.push_str("}\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::Provider;
    use crate::lockfile::decode_locks;
    use crate::source::{PackageHash, Platform, Version, VersionConstraints};

    fn sample() -> Locks {
        let mut locks = Locks::new();

        let mut null = ProviderLock::new(
            Provider::new_default("hashicorp", "null").unwrap(),
            Version::new(2, 1, 0),
            Some(VersionConstraints::parse(">= 2.0.0").unwrap()),
            None,
        );
        null.add_hashes(&Platform::new("linux", "amd64"), [PackageHash::new("h1:abc="), PackageHash::new("zh:00ff")]);
        null.add_hashes(&Platform::new("darwin", "arm64"), []);
        locks.set_provider(null).unwrap();

        locks
            .set_provider(ProviderLock::new(
                "example.com/acme/widget".parse().unwrap(),
                Version::new(0, 1, 0),
                Some(VersionConstraints::default()),
                None,
            ))
            .unwrap();
        locks
    }

    #[test]
    fn test_encode_layout() {
        let expected = r#"# This file is maintained automatically by "provman install".
# Manual edits may be lost in future updates.

provider "example.com/acme/widget" {
  version = "0.1.0"
}

provider "registry.terraform.io/hashicorp/null" {
  version     = "2.1.0"
  constraints = ">= 2.0.0"

  hashes {
    darwin_arm64 = []
    linux_amd64 = [
      "h1:abc=",
      "zh:00ff",
    ]
  }
}
"#;
        assert_eq!(encode_locks(&sample()), expected);
    }

    #[test]
    fn test_version_only_is_not_padded() {
        let mut locks = Locks::new();
        locks
            .set_provider(ProviderLock::new(
                Provider::new_default("hashicorp", "null").unwrap(),
                Version::new(1, 0, 0),
                None,
                None,
            ))
            .unwrap();
        assert!(encode_locks(&locks).contains("\n  version = \"1.0.0\"\n"));
    }

    #[test]
    fn test_round_trip_and_determinism() {
        let locks = sample();
        let first = encode_locks(&locks);
        assert_eq!(first, encode_locks(&locks.clone()));

        let (decoded, diags) = decode_locks(&first);
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(decoded, locks);
        assert_eq!(encode_locks(&decoded), first);
    }

    #[test]
    fn test_empty_hashes_block_round_trips() {
        let mut locks = Locks::new();
        locks
            .set_provider(ProviderLock::new(
                Provider::new_default("hashicorp", "null").unwrap(),
                Version::new(1, 0, 0),
                None,
                Some(Default::default()),
            ))
            .unwrap();
        let text = encode_locks(&locks);
        assert!(text.contains("  hashes {\n  }\n"));
        let (decoded, _) = decode_locks(&text);
        assert_eq!(decoded, locks);
    }

    #[test]
    fn test_empty_constraints_are_omitted() {
        let locks = sample();
        let widget = locks.provider(&"example.com/acme/widget".parse().unwrap()).unwrap();
        assert!(widget.version_constraints().is_none());

        let (decoded, _) = decode_locks("provider \"example.com/acme/widget\" {\n  version = \"0.1.0\"\n  constraints = \"\"\n}\n");
        let expected = ProviderLock::new(widget.provider().clone(), widget.version().clone(), None, None);
        assert_eq!(decoded.provider(widget.provider()), Some(&expected));
    }

    #[test]
    fn test_pessimistic_prerelease_round_trips() {
        let mut locks = Locks::new();
        locks
            .set_provider(ProviderLock::new(
                Provider::new_default("hashicorp", "null").unwrap(),
                Version::parse("1.2.0-beta").unwrap(),
                Some(VersionConstraints::parse("~> 1.2-beta").unwrap()),
                None,
            ))
            .unwrap();
        let text = encode_locks(&locks);
        assert!(text.contains("constraints = \"~> 1.2-beta\""));
        let (decoded, diags) = decode_locks(&text);
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(decoded, locks);
    }

    #[test]
    fn test_empty_locks() {
        let text = encode_locks(&Locks::new());
        assert_eq!(text.lines().count(), 2);
        let (decoded, diags) = decode_locks(&text);
        assert!(decoded.is_empty() && diags.is_empty());
    }
}
