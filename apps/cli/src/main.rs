use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sprd_core::session::{LoaderSession, SessionConfig, SessionOutcome};
use sprd_core::transport::UsbTransport;
use sprd_core::{BootRomClient, NusbTransport, SocratesClient, Width};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Unisoc BootROM / Socrates Tool (Pure Rust)", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Session config file (TOML); flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Say hello to the BootROM and print its version
    Hello {
        /// Send CMD_CONNECT after the hello
        #[arg(long)]
        connect: bool,

        /// Issue the vendor mode-switch request first
        #[arg(long)]
        mode_switch: bool,
    },

    /// Upload a payload and jump into it
    Load {
        /// Payload binary
        #[arg(long)]
        payload: PathBuf,

        /// Load address (default 0x5500)
        #[arg(long, value_parser = parse_u32)]
        address: Option<u32>,

        /// Stack slot holding the BootROM return address
        #[arg(long, value_parser = parse_u32)]
        stack_slot: Option<u32>,

        /// Entry point (default: load address + 0x200)
        #[arg(long, value_parser = parse_u32)]
        target: Option<u32>,

        /// Write a 64-bit return address
        #[arg(long)]
        is_64bit: bool,

        /// Skip CMD_CONNECT
        #[arg(long)]
        no_connect: bool,

        /// Issue the vendor mode-switch request first
        #[arg(long)]
        mode_switch: bool,

        /// Check for a running Socrates agent before loading
        #[arg(long)]
        detect_socrates: bool,
    },

    /// Talk to a running Socrates agent
    Socrates {
        #[command(subcommand)]
        action: SocratesCommand,
    },

    /// Write a default config file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum SocratesCommand {
    /// Print the agent version
    Version,

    /// Read a register
    Read {
        /// Access width in bits (8, 16, 32, 64)
        #[arg(value_parser = parse_width)]
        width: Width,

        #[arg(value_parser = parse_u64)]
        address: u64,
    },

    /// Write a register
    Write {
        /// Access width in bits (8, 16, 32, 64)
        #[arg(value_parser = parse_width)]
        width: Width,

        #[arg(value_parser = parse_u64)]
        address: u64,

        #[arg(value_parser = parse_u64)]
        value: u64,
    },

    /// Initialize the eMMC and print its size
    MmcInfo,

    /// Dump eMMC blocks to a file
    Dump {
        /// First block
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        lba: u32,

        /// Number of blocks (default: to the end of the partition)
        #[arg(long, value_parser = parse_u32)]
        count: Option<u32>,

        /// Hardware partition to select first
        #[arg(long, value_parser = parse_u8)]
        partition: Option<u8>,

        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("Invalid number '{s}': {e}"))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let v = parse_u64(s)?;
    u32::try_from(v).map_err(|_| format!("'{s}' does not fit in 32 bits"))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let v = parse_u64(s)?;
    u8::try_from(v).map_err(|_| format!("'{s}' does not fit in 8 bits"))
}

fn parse_width(s: &str) -> Result<Width, String> {
    let bits = parse_u32(s)?;
    Width::from_bits(bits).ok_or_else(|| format!("Unsupported width {bits} (use 8, 16, 32 or 64)"))
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {e}");
    }

    info!("Starting sprd (nusb backend)...");

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Command::Hello {
            connect,
            mode_switch,
        } => {
            config.mode_switch |= mode_switch;
            let transport = open(&config)?;

            let mut rom = BootRomClient::new(transport).with_retry_policy(config.retry);
            let version = rom.send_hello()?;
            println!("BootROM version: {version}");

            if connect {
                rom.send_connect()?;
                println!("Connected");
            }
        }

        Command::Load {
            payload,
            address,
            stack_slot,
            target,
            is_64bit,
            no_connect,
            mode_switch,
            detect_socrates,
        } => {
            config.payload_path = Some(payload.display().to_string());
            if let Some(address) = address {
                config.load_address = address;
            }
            if stack_slot.is_some() {
                config.stack_slot_address = stack_slot;
            }
            if target.is_some() {
                config.jump_target = target;
            }
            config.is_64bit |= is_64bit;
            config.send_connect &= !no_connect;
            config.mode_switch |= mode_switch;
            config.detect_socrates |= detect_socrates;

            match LoaderSession::new(config).run()? {
                SessionOutcome::SocratesRunning(version) => {
                    println!("Socrates already running ({version}), nothing loaded");
                }
                SessionOutcome::Loaded {
                    bootrom_version,
                    bytes,
                } => {
                    println!("Uploaded {bytes} bytes to {bootrom_version} (not started)");
                }
                SessionOutcome::Started {
                    bootrom_version,
                    bytes,
                    target,
                } => {
                    println!(
                        "Uploaded {bytes} bytes to {bootrom_version}, jumped to 0x{target:08X}"
                    );
                }
            }
        }

        Command::Socrates { action } => {
            let transport = open(&config)?;
            let soc = SocratesClient::new(transport)
                .with_retry_policy(config.retry)
                .with_timeout(config.diag_timeout());
            run_socrates(soc, action)?;
        }

        Command::InitConfig { path } => {
            SessionConfig::default()
                .save_to_file(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

/// Wait for the device and apply the mode switch if configured.
fn open(config: &SessionConfig) -> Result<NusbTransport> {
    let mut transport = LoaderSession::new(config.clone()).wait_for_device()?;
    if config.mode_switch {
        transport.mode_switch().context("Mode switch failed")?;
    }
    Ok(transport)
}

fn run_socrates(mut soc: SocratesClient<NusbTransport>, action: SocratesCommand) -> Result<()> {
    match action {
        SocratesCommand::Version => {
            let version = soc.version()?;
            println!("{} (revision {})", version.name, version.number);
        }

        SocratesCommand::Read { width, address } => {
            let value = soc.read(width, address)?;
            let digits = width.bytes() * 2;
            println!("0x{address:08X}: 0x{value:0digits$X}");
        }

        SocratesCommand::Write {
            width,
            address,
            value,
        } => {
            if value > width.max_value() {
                bail!("Value 0x{value:X} does not fit in {width} bits");
            }
            soc.write(width, address, value)?;
            println!("Wrote 0x{value:X} to 0x{address:08X}");
        }

        SocratesCommand::MmcInfo => {
            soc.mmc_init()?;
            let sectors = soc.mmc_sector_count()?;
            let bytes = u64::from(sectors) * 512;
            println!(
                "eMMC: {sectors} blocks ({:.2} GiB)",
                bytes as f64 / (1024.0 * 1024.0 * 1024.0)
            );
        }

        SocratesCommand::Dump {
            lba,
            count,
            partition,
            out,
        } => {
            soc.mmc_init()?;
            if let Some(partition) = partition {
                soc.mmc_switch(partition)?;
            }
            let count = match count {
                Some(count) => count,
                None => soc.mmc_sector_count()?.saturating_sub(lba),
            };

            let file = File::create(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            info!(lba, count, out = %out.display(), "Dumping eMMC");

            soc.mmc_read_blocks_with_progress(lba, count, BufWriter::new(file), |done, total| {
                if done % 2048 == 0 || done == total {
                    info!("Dumped {}/{} blocks", done, total);
                }
            })?;
            println!("Dumped {count} blocks to {}", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_u64("0x5500"), Ok(0x5500));
        assert_eq!(parse_u64("0X00_80_00_00"), Ok(0x0080_0000));
        assert_eq!(parse_u64("21760"), Ok(0x5500));
        assert!(parse_u64("0xZZ").is_err());
        assert!(parse_u32("0x1_0000_0000").is_err());
        assert!(parse_u8("256").is_err());
    }

    #[test]
    fn test_parse_width() {
        assert_eq!(parse_width("32"), Ok(Width::W32));
        assert!(parse_width("24").is_err());
    }

    #[test]
    fn test_load_flags() {
        let cli = Cli::try_parse_from([
            "sprd",
            "-v",
            "load",
            "--payload",
            "fdl1.bin",
            "--stack-slot",
            "0x3f00",
            "--is-64bit",
            "--no-connect",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Load {
                stack_slot,
                is_64bit,
                no_connect,
                address,
                ..
            } => {
                assert_eq!(stack_slot, Some(0x3F00));
                assert!(is_64bit);
                assert!(no_connect);
                assert_eq!(address, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_socrates_read_args() {
        let cli = Cli::try_parse_from(["sprd", "socrates", "read", "16", "0x40000000"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Socrates {
                action: SocratesCommand::Read {
                    width: Width::W16,
                    address: 0x4000_0000
                }
            }
        ));
    }
}
