//! Hub name mapping for display
//! Maps numeric hub ids from the unserviceable users export to depot names

use std::collections::HashMap;
use std::sync::LazyLock;

pub const UNKNOWN_HUB: &str = "Unknown Hub";

/// Built-in hub names
pub static HUB_NAMES: LazyLock<HashMap<i64, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // North
    m.insert(5, "Leeds");
    m.insert(7, "York");
    m.insert(9, "Sheffield");
    m.insert(15, "Preston");
    m.insert(17, "Newcastle");
    m.insert(30, "Warrington");
    m.insert(1, "Jacksons SK");

    // Midlands
    m.insert(6, "Nottingham");
    m.insert(11, "Lichfield");
    m.insert(13, "Wellingborough");

    // South
    m.insert(18, "Harrow");
    m.insert(19, "Sidcup");
    m.insert(20, "Guildford");
    m.insert(22, "Southampton");
    m.insert(25, "Swindon");

    m
});

/// Hub id to display name lookup, built-in names plus configured overrides
#[derive(Debug, Clone)]
pub struct HubDirectory {
    names: HashMap<i64, String>,
}

impl HubDirectory {
    pub fn new(overrides: &HashMap<i64, String>) -> Self {
        let mut names: HashMap<i64, String> = HUB_NAMES
            .iter()
            .map(|(id, name)| (*id, name.to_string()))
            .collect();
        names.extend(overrides.iter().map(|(id, name)| (*id, name.clone())));
        Self { names }
    }

    /// Display name, falling back to the placeholder label if not mapped
    pub fn name(&self, hub_id: i64) -> String {
        self.names
            .get(&hub_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_HUB.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for HubDirectory {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_hub() {
        assert_eq!(HubDirectory::default().name(25), "Swindon");
    }

    #[test]
    fn test_unknown_hub() {
        assert_eq!(HubDirectory::default().name(999), UNKNOWN_HUB);
    }

    #[test]
    fn test_override_and_extend() {
        let overrides = HashMap::from([(25, "Bristol".to_string()), (40, "Exeter".to_string())]);
        let hubs = HubDirectory::new(&overrides);
        assert_eq!(hubs.name(25), "Bristol");
        assert_eq!(hubs.name(40), "Exeter");
        assert_eq!(hubs.name(7), "York");
        assert_eq!(hubs.len(), HUB_NAMES.len() + 1);
    }
}
