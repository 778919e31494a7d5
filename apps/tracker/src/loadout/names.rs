use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "Amber", "Ashen", "Brave", "Crimson", "Dusky", "Feral", "Gilded", "Hollow", "Iron", "Jade",
    "Lunar", "Molten", "Quiet", "Radiant", "Silent", "Solar", "Stormy", "Umbral", "Vivid", "Wild",
];

const NOUNS: &[&str] = &[
    "Anchor", "Beacon", "Comet", "Drifter", "Ember", "Falcon", "Garden", "Harbor", "Lantern",
    "Meridian", "Nomad", "Oracle", "Pilgrim", "Raven", "Sentinel", "Spire", "Tempest", "Vanguard",
    "Warden", "Zenith",
];

/// Two-word display name ("Crimson Lantern") for snapshots and sessions that
/// were not named by the user.
pub fn generate_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Unnamed");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Loadout");
    format!("{adjective} {noun}")
}
