use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use vtest_core::config::{default_config_path, PutLengthMode};
use vtest_core::VtestConfig;
use vtest_protocol::{BindFlags, PipeBox};
use vtest_winsys::{ResourceDesc, WaitTimeout, Winsys};

#[derive(Parser)]
#[command(name = "vtest")]
#[command(about = "vtest - query and exercise a remote virgl renderer")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Renderer socket (Unix path or host:port), overrides the config file
    #[arg(short, long, global = true)]
    socket: Option<String>,

    /// Declare TRANSFER_PUT lengths in words instead of the legacy byte count
    #[arg(long, global = true)]
    word_put_length: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, negotiate capabilities and print them
    Caps,

    /// Upload and read back a buffer, then wait on a fence
    Smoke {
        /// Buffer size in bytes
        #[arg(long, default_value_t = 4096)]
        size: u32,
    },

    /// Create and release buffers of varying sizes to exercise the reuse cache
    Churn {
        /// Number of create/release rounds
        #[arg(short = 'n', long, default_value_t = 1000)]
        rounds: u32,

        /// Largest requested buffer size in bytes
        #[arg(long, default_value_t = 65536)]
        max_size: u32,
    },
}

fn main() -> anyhow::Result<()> {
    vtest_common::init_logging();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = if cli.config.is_some() {
        VtestConfig::load(&config_path)
            .with_context(|| format!("failed to load {}", config_path))?
    } else {
        VtestConfig::load_or_default(&config_path)
    };
    config.apply_env();
    if let Some(socket) = cli.socket {
        config.transport.socket = socket;
    }
    if cli.word_put_length {
        config.protocol.put_length = PutLengthMode::Words;
    }

    info!("connecting to renderer at {}", config.transport.socket);
    let mut ws = Winsys::connect(&config)
        .with_context(|| format!("failed to connect to {}", config.transport.socket))?;

    match cli.command {
        Commands::Caps => print_caps(&ws),
        Commands::Smoke { size } => smoke(&ws, size)?,
        Commands::Churn { rounds, max_size } => churn(&ws, rounds, max_size)?,
    }

    ws.shutdown()?;
    Ok(())
}

fn print_caps(ws: &Winsys) {
    let caps = ws.caps();
    let v1 = caps.v1();
    println!("Renderer capabilities (struct version {}):", caps.version);
    println!();
    println!("  max version:          {}", v1.max_version);
    println!("  GLSL level:           {}", v1.glsl_level);
    println!("  render targets:       {}", v1.max_render_targets);
    println!("  samples:              {}", v1.max_samples);
    println!("  texture array layers: {}", v1.max_texture_array_layers);
    println!("  uniform blocks:       {}", v1.max_uniform_blocks);
    println!("  viewports:            {}", v1.max_viewports);
    if caps.version >= 2 {
        let v2 = &caps.v2;
        println!("  2D texture size:      {}", v2.max_texture_2d_size);
        println!("  3D texture size:      {}", v2.max_texture_3d_size);
        println!("  vertex attributes:    {}", v2.max_vertex_attribs);
        println!("  capability bits:      {:#010x}", v2.capability_bits);
        println!(
            "  point size:           {} - {}",
            v2.min_aliased_point_size, v2.max_aliased_point_size
        );
    }
}

fn smoke(ws: &Winsys, size: u32) -> anyhow::Result<()> {
    let buf = ws.resource_create(ResourceDesc::buffer(BindFlags::VERTEX_BUFFER, size))?;
    let pattern: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    ws.resource_map(&buf).write(0, &pattern)?;

    let region = PipeBox::extent_2d(size, 1);
    let start = Instant::now();
    ws.transfer_put(&buf, &region, 0, 0, 0, 0)?;
    ws.resource_map(&buf).fill(0);
    ws.transfer_get(&buf, &region, 0, 0, 0, 0)?;
    let elapsed = start.elapsed();

    let matches = ws.resource_map(&buf).with(|bytes| bytes == pattern.as_slice());
    println!(
        "round trip of {} bytes: {} in {:?}",
        size,
        if matches { "ok" } else { "MISMATCH" },
        elapsed
    );

    let fence = ws.create_fence()?;
    let signaled = ws.fence_wait(&fence, WaitTimeout::Within(Duration::from_secs(5)))?;
    println!("fence {}: {}", fence.handle(), if signaled { "signaled" } else { "timed out" });

    ws.fence_release(fence)?;
    ws.resource_unref(&buf)?;

    if !matches {
        anyhow::bail!("read back data differs from what was uploaded");
    }
    Ok(())
}

fn churn(ws: &Winsys, rounds: u32, max_size: u32) -> anyhow::Result<()> {
    let max_size = max_size.max(1);
    let binds = [
        BindFlags::VERTEX_BUFFER,
        BindFlags::INDEX_BUFFER,
        BindFlags::CONSTANT_BUFFER,
    ];

    let start = Instant::now();
    let before = ws.registry().handles_allocated();
    // Deterministic pseudo-random sizes so runs are comparable.
    let mut seed: u32 = 0x9e37_79b9;
    for round in 0..rounds {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let size = seed % max_size + 1;
        let bind = binds[round as usize % binds.len()];

        let res = ws.resource_create(ResourceDesc::buffer(bind, size))?;
        ws.resource_unref(&res)?;
    }
    let created = ws.registry().handles_allocated() - before;

    println!(
        "{} rounds in {:?}: {} remote creates, {} reused, {} cached",
        rounds,
        start.elapsed(),
        created,
        rounds.saturating_sub(created),
        ws.registry().cached_count()
    );
    Ok(())
}
