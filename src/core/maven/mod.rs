mod artifact;

pub use artifact::MavenCoordinate;

/// Fabric's Maven mirrors, in the order they are tried.
pub const FABRIC_MAVENS: [&str; 3] = [
    "https://maven.fabricmc.net/",
    "https://maven2.fabricmc.net/",
    "https://maven3.fabricmc.net/",
];
