// ─── Game Directory Finder ───
// Locates an Equilinox install in the usual Steam library locations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

const GAME_DIR_NAME: &str = "Equilinox";

/// A game dir has `unlockList.dat` and an `Equilinox*UserConfigs.dat`.
pub fn is_valid_game_path(path: &Path) -> bool {
    if !path.is_dir() || !path.join("unlockList.dat").is_file() {
        return false;
    }
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not list {:?}: {}", path, e);
            return false;
        }
    };
    entries.flatten().any(|entry| {
        let name = entry.file_name().to_string_lossy().to_string();
        name.starts_with("Equilinox")
            && name.ends_with("UserConfigs.dat")
            && entry.path().is_file()
    })
}

/// Library paths listed in a Steam `libraryfolders.vdf`.
///
/// Both the current (`"path" "<dir>"`) and the legacy (`"1" "<dir>"`) forms
/// are accepted.
pub fn parse_library_folders(vdf: &str) -> Vec<PathBuf> {
    vdf.lines()
        .filter_map(|line| {
            let tokens = quoted_tokens(line.trim())?;
            let [key, value] = tokens.as_slice() else {
                return None;
            };
            let is_path_key =
                key.eq_ignore_ascii_case("path") || (!key.is_empty() && key.chars().all(|c| c.is_ascii_digit()));
            is_path_key.then(|| PathBuf::from(value.replace("\\\\", "\\")))
        })
        .collect()
}

/// Split `"a"   "b"` into its quoted parts. `None` if anything else is on
/// the line.
fn quoted_tokens(line: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut rest = line;
    while !rest.is_empty() {
        let open = rest.strip_prefix('"')?;
        let close = open.find('"')?;
        let token = &open[..close];
        if token.is_empty() {
            return None;
        }
        tokens.push(token.to_string());
        rest = open[close + 1..].trim_start();
    }
    Some(tokens)
}

fn library_roots_from_vdf(steam_dir: &Path) -> Vec<PathBuf> {
    let vdf = steam_dir.join("steamapps").join("libraryfolders.vdf");
    match std::fs::read_to_string(&vdf) {
        Ok(raw) => parse_library_folders(&raw)
            .into_iter()
            .filter(|p| p.is_dir())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Default Steam install locations for this platform.
fn common_steam_dirs(home: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if cfg!(target_os = "windows") {
        dirs.push(PathBuf::from(r"C:\Program Files (x86)\Steam"));
        dirs.push(PathBuf::from(r"C:\Program Files\Steam"));
        for drive in 'D'..='Z' {
            for name in ["SteamLibrary", "SteamGames", "Steam"] {
                dirs.push(PathBuf::from(format!(r"{drive}:\{name}")));
            }
        }
        dirs.push(PathBuf::from(r"C:\ProgramData\chocolatey\lib\steam-client"));
        dirs.push(PathBuf::from(r"C:\ProgramData\scoop\apps\steam"));
    } else if cfg!(target_os = "macos") {
        dirs.push(home.join("Library").join("Application Support").join("Steam"));
    } else {
        dirs.push(home.join(".steam").join("steam"));
        dirs.push(home.join(".local").join("share").join("Steam"));
    }
    if !cfg!(target_os = "windows") {
        dirs.push(home.join("SteamLibrary"));
    }
    dirs
}

#[cfg(target_os = "windows")]
fn steam_path_from_registry() -> Option<PathBuf> {
    let output = std::process::Command::new("reg")
        .args(["query", r"HKCU\Software\Valve\Steam", "/v", "SteamPath"])
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout).lines().find_map(|line| {
        let (_, value) = line.trim().split_once("REG_SZ")?;
        let value = value.trim();
        (!value.is_empty()).then(|| PathBuf::from(value))
    })
}

#[cfg(not(target_os = "windows"))]
fn steam_path_from_registry() -> Option<PathBuf> {
    None
}

/// Library roots to probe, in priority order, without duplicates.
pub fn candidate_library_roots(home: &Path) -> Vec<PathBuf> {
    let mut steam_dirs: Vec<PathBuf> = steam_path_from_registry().into_iter().collect();
    steam_dirs.extend(common_steam_dirs(home));

    let mut seen = HashSet::new();
    let mut roots = Vec::new();
    for steam in steam_dirs.into_iter().filter(|d| d.is_dir()) {
        let libraries = library_roots_from_vdf(&steam);
        for root in std::iter::once(steam).chain(libraries) {
            if seen.insert(root.clone()) {
                roots.push(root);
            }
        }
    }
    roots
}

/// First valid game directory reachable from `home`.
pub fn find_game_dir_in(home: &Path) -> Option<PathBuf> {
    let scoop = home
        .join("scoop")
        .join("apps")
        .join("steam")
        .join("current")
        .join("steamapps")
        .join("common")
        .join(GAME_DIR_NAME);
    if is_valid_game_path(&scoop) {
        return Some(scoop);
    }

    candidate_library_roots(home)
        .into_iter()
        .map(|root| root.join("steamapps").join("common").join(GAME_DIR_NAME))
        .find(|candidate| {
            let valid = is_valid_game_path(candidate);
            debug!("Probing {:?}: {}", candidate, valid);
            valid
        })
}

pub fn find_game_dir() -> Option<PathBuf> {
    find_game_dir_in(&dirs::home_dir()?)
}
