/// Agent identity resolution and display-name generation.
///
/// Both binaries resolve the acting agent the same way: explicit flag first,
/// then `FMAIL_AGENT`, then `FORGE_LOOP_NAME`, then a generated fallback.
use crate::error::{Result, SwarmError};

const ADJECTIVES: [&str; 16] = [
    "amber", "brisk", "calm", "deft", "eager", "fleet", "gruff", "hardy", "keen", "lucid",
    "mellow", "nimble", "plucky", "quiet", "stern", "wry",
];

const ANIMALS: [&str; 16] = [
    "otter", "lynx", "heron", "badger", "corvid", "dingo", "egret", "ferret", "gecko", "ibis",
    "jackal", "kestrel", "marmot", "newt", "osprey", "pika",
];

/// Resolve the agent identity from the environment.
///
/// Returns `None` if neither variable is set, letting callers decide whether
/// to fall back to a generated name.
pub fn resolve_agent() -> Option<String> {
    std::env::var("FMAIL_AGENT")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            std::env::var("FORGE_LOOP_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
        })
        .map(|s| s.trim().to_string())
}

/// Generate an adjective-animal display name, e.g. `brisk-otter`.
pub fn generated_name() -> String {
    let bytes = *uuid::Uuid::new_v4().as_bytes();
    let adjective = ADJECTIVES[(bytes[0] as usize) % ADJECTIVES.len()];
    let animal = ANIMALS[(bytes[1] as usize) % ANIMALS.len()];
    format!("{adjective}-{animal}")
}

/// Like [`generated_name`] but with a short disambiguating suffix, for
/// callers that hit a name collision.
pub fn generated_name_suffixed() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", generated_name(), &token[..4])
}

/// Validate an agent or topic name: non-empty ASCII alphanumeric plus
/// hyphen/underscore. Shared by the mail registry and the task store.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SwarmError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-var tests must not run concurrently.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn generated_name_is_wordlist_based() {
        let name = generated_name();
        let (adjective, animal) = name.split_once('-').unwrap();
        assert!(ADJECTIVES.contains(&adjective));
        assert!(ANIMALS.contains(&animal));
    }

    #[test]
    fn suffixed_name_adds_four_hex_chars() {
        let name = generated_name_suffixed();
        let suffix = name.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 4);
    }

    #[test]
    fn resolve_agent_prefers_fmail_agent() {
        let _guard = ENV_LOCK.lock().unwrap();

        unsafe {
            std::env::set_var("FMAIL_AGENT", "rust-full-codex-a");
            std::env::set_var("FORGE_LOOP_NAME", "loop-7");
        }
        assert_eq!(resolve_agent(), Some("rust-full-codex-a".to_string()));

        unsafe { std::env::remove_var("FMAIL_AGENT") };
        assert_eq!(resolve_agent(), Some("loop-7".to_string()));

        unsafe { std::env::remove_var("FORGE_LOOP_NAME") };
        assert_eq!(resolve_agent(), None);
    }

    #[test]
    fn validate_name_rejects_spaces_and_empty() {
        assert!(validate_name("rust-full-codex-a").is_ok());
        assert!(validate_name("bad name").is_err());
        assert!(validate_name("").is_err());
    }
}
