use crate::bridge::BridgeTuning;
use crate::channel::{control_file_name, state_file_name};
use crate::error::ConfigError;
use crate::identity::InstanceId;
use crate::social::SocialTuning;
use crate::wander::{Body, Rect, WanderMode, WanderPreset};
use clap::Parser;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extra height reserved under the sprite for the project label.
pub const LABEL_HEIGHT: f64 = 20.0;

#[derive(Parser, Debug, Clone)]
#[command(name = "deskmate")]
#[command(about = "Desktop companion core: animation, wandering and social coordination", long_about = None)]
pub struct Args {
    /// Project or session identifier the instance belongs to.
    #[arg(long, env = "DESKMATE_SESSION")]
    pub session: Option<String>,

    /// Sprite size in pixels.
    #[arg(long, default_value_t = 128)]
    pub size: u32,

    /// Project label drawn under the pet.
    #[arg(long)]
    pub label: Option<String>,

    /// Directive file written by host hooks.
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Directory shared by all instances.
    #[arg(long)]
    pub runtime_dir: Option<PathBuf>,

    /// Monitor rectangle `x,y,width,height`; repeat for each screen.
    #[arg(long = "monitor", value_parser = parse_rect)]
    pub monitors: Vec<Rect>,

    /// Use the active wander preset.
    #[arg(long)]
    pub active: bool,

    #[arg(long)]
    pub no_social: bool,

    #[arg(long)]
    pub no_wander: bool,

    /// YAML animation table overriding the built-in one.
    #[arg(long)]
    pub animations: Option<PathBuf>,

    /// JSON settings file with tuning values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print every resolved frame as a JSON line.
    #[arg(long)]
    pub emit_frames: bool,

    #[arg(long)]
    pub debug: bool,
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    s.parse()
}

/// Optional tuning read from the settings file. Never written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub social: SocialTuning,
    pub bridge: BridgeTuning,
    pub wander_mode: Option<WanderMode>,
    /// Full preset, replacing the calm/active tables.
    pub wander_preset: Option<WanderPreset>,
}

impl FileSettings {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deskmate")
            .join("config.json")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the default file if present. A missing default is not an error.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        match Self::load(&path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!("no settings at {}", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }
}

/// Everything one instance needs, resolved from flags and settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub session: String,
    pub id: InstanceId,
    pub runtime_dir: PathBuf,
    pub state_file: PathBuf,
    pub control_file: PathBuf,
    pub body: Body,
    pub label: Option<String>,
    pub monitors: Vec<Rect>,
    pub preset: WanderPreset,
    pub social: Option<SocialTuning>,
    pub bridge: BridgeTuning,
    pub wander: bool,
    pub animations: Option<PathBuf>,
    pub emit_frames: bool,
}

impl Settings {
    /// Flags win over the settings file.
    pub fn resolve(args: Args, file: FileSettings) -> Self {
        let session = args.session.clone().unwrap_or_else(default_session);
        let id = InstanceId::derive(&session);
        let runtime_dir = args.runtime_dir.clone().unwrap_or_else(std::env::temp_dir);
        let state_file = args
            .state_file
            .clone()
            .unwrap_or_else(|| runtime_dir.join(state_file_name(&id)));
        let control_file = runtime_dir.join(control_file_name(&id));

        let size = f64::from(args.size.max(1));
        let height = if args.label.is_some() { size + LABEL_HEIGHT } else { size };

        let monitors = if args.monitors.is_empty() {
            vec![Rect::default()]
        } else {
            args.monitors.clone()
        };

        let mode = if args.active || args.debug {
            WanderMode::Active
        } else {
            file.wander_mode.unwrap_or(WanderMode::Calm)
        };
        let preset = match file.wander_preset {
            Some(preset) if !(args.active || args.debug) => preset,
            _ => WanderPreset::for_mode(mode),
        };

        Settings {
            session,
            id,
            runtime_dir,
            state_file,
            control_file,
            body: Body { width: size, height },
            label: args.label,
            monitors,
            preset,
            social: (!args.no_social).then_some(file.social),
            bridge: file.bridge,
            wander: !args.no_wander,
            animations: args.animations,
            emit_frames: args.emit_frames,
        }
    }
}

fn default_session() -> String {
    std::env::current_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|_| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["deskmate", "--session", "proj"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let s = Settings::resolve(args(&[]), FileSettings::default());
        assert_eq!(s.id, InstanceId::derive("proj"));
        assert_eq!(s.body, Body { width: 128.0, height: 128.0 });
        assert_eq!(s.monitors, vec![Rect::new(0.0, 0.0, 1920.0, 1080.0)]);
        assert_eq!(s.preset, WanderPreset::calm());
        assert!(s.social.is_some());
        assert!(s.wander);
        assert!(s.state_file.ends_with(format!("deskmate-{}-state", s.id)));
    }

    #[test]
    fn test_flags() {
        let s = Settings::resolve(
            args(&[
                "--size", "96", "--label", "api", "--monitor", "0,0,1280,1024", "--monitor",
                "1280,0,1920,1080", "--runtime-dir", "/tmp/dm", "--no-social", "--debug",
            ]),
            FileSettings::default(),
        );
        assert_eq!(s.body, Body { width: 96.0, height: 116.0 });
        assert_eq!(s.monitors.len(), 2);
        assert_eq!(s.preset, WanderPreset::active());
        assert!(s.social.is_none());
        assert_eq!(s.control_file, PathBuf::from("/tmp/dm").join(format!("deskmate-{}-control", s.id)));
    }

    #[test]
    fn test_bad_monitor_is_rejected() {
        assert!(Args::try_parse_from(["deskmate", "--monitor", "0,0,wide,1080"]).is_err());
    }

    #[test]
    fn test_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"social": {"fight_distance": 0.8}, "wander_mode": "active"}"#).unwrap();
        let file = FileSettings::load(&path).unwrap();
        assert_eq!(file.social.fight_distance, 0.8);
        assert_eq!(file.social.stale_after_ms, 3000);

        let s = Settings::resolve(args(&[]), file);
        assert_eq!(s.preset, WanderPreset::active());
        assert_eq!(s.social.map(|t| t.fight_distance), Some(0.8));

        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(FileSettings::load(&path), Err(ConfigError::Settings { .. })));
    }
}
