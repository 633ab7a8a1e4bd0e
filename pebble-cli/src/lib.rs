//! Shared CLI plumbing for the two `pebble-cli` binaries: the image-profile
//! argument both parse identically, and the one-line `tracing` subscriber
//! setup each binary performs before doing any real work.

use clap::ValueEnum;
use pebble_types::Profile;

/// `clap`-friendly mirror of [`pebble_types::Profile`] — `Profile` itself
/// carries no `clap` dependency, so the CLI layer owns the mapping.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProfileArg {
    /// `SMALL_MEM`: 16-bit references, a 6500-slot default table.
    Small,
    /// `LARGE_MEM`: 32-bit references, a 65000-slot default table.
    Large,
}

impl From<ProfileArg> for Profile {
    fn from(p: ProfileArg) -> Self {
        match p {
            ProfileArg::Small => Profile::Small,
            ProfileArg::Large => Profile::Large,
        }
    }
}

/// Install a `tracing-subscriber` fmt layer configured from `RUST_LOG`,
/// set up once in `main` before touching the image.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
