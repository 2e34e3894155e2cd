// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod config;
mod renderer;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};
use mimalloc::MiMalloc;
use track_engine::{Engine, VisibleTrack};

use config::{AppConfig, ViewportBounds};
use renderer::{ConsoleRenderer, OutputMode};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Headless live aircraft tracker
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Websocket URL of the snapshot feed
    #[arg(long)]
    feed_url: Option<String>,

    /// Base URL of the HTTP API
    #[arg(long)]
    api_url: Option<String>,

    /// Viewport as "south,north,west,east" in degrees
    #[arg(long, value_parser = ViewportBounds::parse, allow_hyphen_values = true)]
    viewport: Option<ViewportBounds>,

    /// Maximum number of aircraft in the visible set
    #[arg(long)]
    max_visible: Option<usize>,

    /// Seconds between console reports
    #[arg(long)]
    report_interval: Option<u64>,

    /// Number of aircraft listed in each summary
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Emit one JSON object per visible aircraft instead of a summary
    #[arg(long)]
    json: bool,

    /// Disable HTTP polling while the push feed is connected
    #[arg(long)]
    no_poll_when_connected: bool,

    /// Persist the merged settings to the config file
    #[arg(long)]
    save: bool,

    /// Print the config file path and exit
    #[arg(long)]
    config_path: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.feed_url {
            config.feed_url.clone_from(url);
        }
        if let Some(url) = &self.api_url {
            config.api_url.clone_from(url);
        }
        if let Some(viewport) = self.viewport {
            config.viewport = Some(viewport);
        }
        if let Some(max) = self.max_visible {
            config.max_visible = max;
        }
        if let Some(secs) = self.report_interval {
            config.report_interval_secs = secs;
        }
        if self.no_poll_when_connected {
            config.poll_when_connected = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.config_path {
        println!("{}", AppConfig::get_config_path()?.display());
        return Ok(());
    }

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });
    args.apply(&mut config);

    if args.save {
        config.save()?;
        info!("Saved config to {}", AppConfig::get_config_path()?.display());
    }

    info!(
        "Starting airtrack: feed {} api {} max visible {}",
        config.feed_url, config.api_url, config.max_visible
    );

    let engine = Engine::spawn(config.engine_config())?;

    let mode = if args.json {
        OutputMode::JsonLines
    } else {
        OutputMode::Summary
    };
    let renderer = ConsoleRenderer::new(mode, args.top);

    // Callbacks fire every tick; keep the newest set and print on the report interval.
    let latest: Arc<Mutex<Arc<Vec<VisibleTrack>>>> = Arc::default();
    let sink = Arc::clone(&latest);
    engine.subscribe(move |visible| {
        *sink.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(visible.to_vec());
    });

    let mut report = tokio::time::interval(Duration::from_secs(config.report_interval_secs.max(1)));
    report.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for ctrl-c: {e}");
                }
                break;
            }
            _ = report.tick() => {
                let now = Utc::now();
                info!("{}", ConsoleRenderer::status_line(&engine.status(), now));
                let visible = Arc::clone(&latest.lock().unwrap_or_else(PoisonError::into_inner));
                for line in renderer.render(&visible, now) {
                    println!("{line}");
                }
            }
        }
    }

    info!("Shutting down");
    engine.shutdown_and_wait().await;
    Ok(())
}
