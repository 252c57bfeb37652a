use std::collections::HashSet;

/// Desktop applications nudged about during study time: social, media,
/// chat and games. Matched against the lowercased foreground app id.
pub const BUILTIN_RESTRICTED_APPS: &[&str] = &[
    "discord",
    "slack",
    "telegram-desktop",
    "whatsapp",
    "signal",
    "spotify",
    "vlc",
    "mpv",
    "steam",
    "steamwebhelper",
    "lutris",
    "heroic",
    "minecraft-launcher",
    "roblox",
    "epicgameslauncher",
    "battle.net.exe",
    "leagueclient.exe",
    "genshinimpact.exe",
    "youtube-music",
    "freetube",
    "netflix",
    "tiktok",
    "instagram",
    "facebook",
    "messenger",
    "snapchat",
];

/// Source of the distracting-app set. Read on every focus tick so edits take
/// effect mid-session.
pub trait RestrictedApps: Send + Sync {
    fn restricted_apps(&self) -> HashSet<String>;

    fn is_restricted(&self, app_id: &str) -> bool {
        self.restricted_apps().contains(&app_id.to_lowercase())
    }
}

/// Built-in list plus user additions, minus user removals. Case-insensitive.
pub fn effective_restricted(added: &[String], removed: &[String]) -> HashSet<String> {
    let removed: HashSet<String> = removed.iter().map(|app| app.trim().to_lowercase()).collect();

    BUILTIN_RESTRICTED_APPS
        .iter()
        .map(|app| app.to_string())
        .chain(added.iter().map(|app| app.trim().to_lowercase()))
        .filter(|app| !app.is_empty() && !removed.contains(app))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additions_and_removals_apply_case_insensitively() {
        let set = effective_restricted(
            &["Reddit-Desktop".into(), "  ".into()],
            &["SPOTIFY".into()],
        );

        assert!(set.contains("reddit-desktop"));
        assert!(set.contains("discord"));
        assert!(!set.contains("spotify"));
        assert!(!set.contains(""));
    }

    #[test]
    fn builtin_ids_are_lowercase() {
        for app in BUILTIN_RESTRICTED_APPS {
            assert_eq!(*app, app.to_lowercase());
        }
    }
}
