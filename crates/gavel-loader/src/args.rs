//! Flag grammar of the loader/verifier tool.
//!
//! ```text
//! common   -m <shards> -p <replicas> -f <durationFloor> (-s <scale> | -u <users>)
//! load     -d <itemCatalog> -t <threads> [-r <imageSource>] -a <runLabel>
//! prepare  -a <auctions>
//! check    -a <auctions> -c
//! ```
//!
//! `-a` means the run label when loading and the auction count otherwise.
//! Active profiles reach the tool through [`PROFILES_ENV`].

use gavel_core::config::LoaderConfig;
use gavel_core::{ScaleTarget, TopologyView};

/// Environment variable selecting the tool's Spring profiles.
pub const PROFILES_ENV: &str = "SPRING_PROFILES_ACTIVE";

/// Which behavior the tool is invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMode {
    Load,
    Prepare,
    Check,
}

/// One invocation's flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolArgs {
    pub mode: ToolMode,
    pub target: ScaleTarget,
    pub shards: u32,
    pub replicas: u32,
    pub duration_floor: u64,
    /// Ignored in load mode.
    pub auctions: u32,
    /// Comma-separated profiles; empty leaves the tool's default.
    pub profiles: String,
}

impl ToolArgs {
    pub fn new(mode: ToolMode, target: ScaleTarget, shards: u32, replicas: u32, duration_floor: u64) -> Self {
        Self {
            mode,
            target,
            shards,
            replicas,
            duration_floor,
            auctions: 0,
            profiles: String::new(),
        }
    }

    /// Flags for `mode` sized and wired for `view`.
    pub fn for_view(mode: ToolMode, target: ScaleTarget, view: &TopologyView, duration_floor: u64) -> Self {
        Self::new(mode, target, view.shards(), view.replicas(), duration_floor).with_profiles(view.active_profiles())
    }

    pub fn with_profiles(mut self, profiles: impl Into<String>) -> Self {
        self.profiles = profiles.into();
        self
    }

    pub fn with_auctions(mut self, auctions: u32) -> Self {
        self.auctions = auctions;
        self
    }

    /// Flags in invocation order.
    pub fn to_args(&self, loader: &LoaderConfig) -> Vec<String> {
        let mut args = Vec::new();
        match self.mode {
            ToolMode::Load => {
                args.extend(["-d".to_string(), loader.item_catalog.clone()]);
                args.extend(["-t".to_string(), loader.threads.to_string()]);
                if let Some(source) = &loader.image_source {
                    args.extend(["-r".to_string(), source.clone()]);
                }
                args.extend(["-a".to_string(), loader.run_label.clone()]);
            }
            ToolMode::Prepare | ToolMode::Check => {
                args.extend(["-a".to_string(), self.auctions.to_string()]);
            }
        }
        args.extend(["-m".to_string(), self.shards.to_string()]);
        args.extend(["-p".to_string(), self.replicas.to_string()]);
        args.extend(["-f".to_string(), self.duration_floor.to_string()]);
        args.extend(self.target.tool_args());
        if self.mode == ToolMode::Check {
            args.push("-c".to_string());
        }
        args
    }

    /// `<tool> <flags>`.
    pub fn invocation(&self, loader: &LoaderConfig) -> String {
        let tool = match self.mode {
            ToolMode::Load => &loader.loader_command,
            ToolMode::Prepare | ToolMode::Check => &loader.prep_command,
        };
        format!("{} {}", tool, self.to_args(loader).join(" "))
    }

    /// `SPRING_PROFILES_ACTIVE=<profiles> ` or nothing.
    pub fn env_prefix(&self) -> String {
        if self.profiles.is_empty() {
            String::new()
        } else {
            format!("{PROFILES_ENV}={} ", self.profiles)
        }
    }

    /// Full shell command: `cd <working_dir> && [env] <tool> <flags>`.
    pub fn command(&self, loader: &LoaderConfig) -> String {
        format!("cd {} && {}{}", loader.working_dir, self.env_prefix(), self.invocation(loader))
    }

    /// Detached launch writing all output to the loader log.
    pub fn background_command(&self, loader: &LoaderConfig) -> String {
        format!(
            "cd {} && {}nohup {} > {} 2>&1 &",
            loader.working_dir,
            self.env_prefix(),
            self.invocation(loader),
            loader.log_file
        )
    }
}
