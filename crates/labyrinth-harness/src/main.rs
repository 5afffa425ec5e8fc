//! Labyrinth simulator.
//!
//! Runs one account end to end against the in-memory server: genesis,
//! recovery onto extra devices, rotations, a persisted-session resume, and an
//! inactivity-triggered rotation.
//!
//! # Usage
//!
//! ```bash
//! labyrinth-sim --devices 3 --rotations 2 --seed 42
//! RUST_LOG=labyrinth_core=debug labyrinth-sim
//! ```

use std::time::Duration;

use clap::Parser;
use labyrinth_core::{Base64Codec, Labyrinth, LabyrinthSerialized, SequenceId};
use labyrinth_harness::{MemoryServer, MemoryServerConfig, SimEnv};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type Session = Labyrinth<SimEnv, Base64Codec>;

const NO_SESSIONS: &str = "scenario has no sessions";

/// Labyrinth protocol simulator
#[derive(Parser, Debug)]
#[command(name = "labyrinth-sim")]
#[command(about = "Run a deterministic multi-device Labyrinth scenario")]
#[command(version)]
struct Args {
    /// Account user id
    #[arg(long, default_value = "alice")]
    user_id: String,

    /// Number of devices, including the one that creates the account
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=64))]
    devices: u32,

    /// Manual rotations after all devices joined
    #[arg(long, default_value = "2")]
    rotations: u32,

    /// Idle time after which the server reports a device as inactive
    #[arg(long, default_value = "2592000")]
    inactivity_limit_secs: u64,

    /// RNG seed
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let summary = run(&args).await?;
    info!(
        newest_sequence_id = %summary.newest_sequence_id,
        devices = summary.devices,
        epochs = summary.epochs,
        "simulation finished"
    );
    Ok(())
}

/// State of the account when the scenario ends.
#[derive(Debug, PartialEq, Eq)]
struct Summary {
    newest_sequence_id: SequenceId,
    devices: usize,
    epochs: usize,
}

async fn run(args: &Args) -> Result<Summary, Box<dyn std::error::Error>> {
    let env = SimEnv::with_seed(args.seed);
    let inactivity_limit = Duration::from_secs(args.inactivity_limit_secs);
    let server = MemoryServer::new(env.clone(), MemoryServerConfig { inactivity_limit });

    info!(user_id = %args.user_id, seed = args.seed, "simulation starting");

    let (first, recovery_code) =
        Labyrinth::initialize(&args.user_id, &server, env.clone(), Base64Codec).await?;
    let mut sessions: Vec<Session> = vec![first];

    for _ in 1..args.devices {
        let session = Labyrinth::from_recovery_code(
            &args.user_id,
            recovery_code.as_str(),
            &server,
            env.clone(),
            Base64Codec,
        )
        .await?;
        sessions.push(session);
    }

    // Devices authenticate to each epoch before the next one is opened
    for _ in 0..args.rotations {
        let rotator = sessions.first_mut().ok_or(NO_SESSIONS)?;
        let sequence_id = rotator.rotate_epoch(&server).await?;
        info!(device_id = rotator.device().id(), %sequence_id, "manual rotation");

        sessions = resume_all(&sessions, &server, &env).await?;
        check_agreement(&sessions)?;
    }

    // Only the first device stays active past the limit
    env.advance(inactivity_limit + Duration::from_secs(1));
    let first = sessions.first().ok_or(NO_SESSIONS)?;
    let survivor =
        Labyrinth::deserialize(&first.serialize(), &server, env.clone(), Base64Codec).await?;

    Ok(Summary {
        newest_sequence_id: survivor.newest_epoch_sequence_id()?,
        devices: server.device_count(),
        epochs: server.epoch_count(),
    })
}

/// Persist every session through CBOR and resume it.
async fn resume_all(
    sessions: &[Session],
    server: &MemoryServer<SimEnv>,
    env: &SimEnv,
) -> Result<Vec<Session>, Box<dyn std::error::Error>> {
    let mut resumed = Vec::with_capacity(sessions.len());
    for session in sessions {
        let restored = persist_and_restore(session)?;
        resumed.push(Labyrinth::deserialize(&restored, server, env.clone(), Base64Codec).await?);
    }
    Ok(resumed)
}

fn persist_and_restore(session: &Session) -> Result<LabyrinthSerialized, Box<dyn std::error::Error>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(&session.serialize(), &mut bytes)?;
    Ok(ciborium::from_reader(bytes.as_slice())?)
}

/// Every session holds the same newest epoch and reads every other
/// session's messages.
fn check_agreement(sessions: &[Session]) -> Result<(), Box<dyn std::error::Error>> {
    let Some(sender) = sessions.first() else {
        return Ok(());
    };
    let sequence_id = sender.newest_epoch_sequence_id()?;
    let ciphertext = sender.encrypt("sim-thread", sequence_id, b"hello from the first device")?;

    for session in sessions {
        if session.newest_epoch_sequence_id()? != sequence_id {
            return Err(format!("{} did not reach epoch {sequence_id}", session.device().id()).into());
        }
        session.decrypt("sim-thread", sequence_id, &ciphertext)?;
    }

    info!(sessions = sessions.len(), %sequence_id, "all devices agree");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(devices: u32, rotations: u32) -> Args {
        Args {
            user_id: "alice".to_owned(),
            devices,
            rotations,
            inactivity_limit_secs: 60,
            seed: 7,
            log_level: "info".to_owned(),
        }
    }

    #[tokio::test]
    async fn scenario_rotates_and_evicts_idle_devices() {
        let summary = run(&args(3, 2)).await.unwrap();

        // Two manual rotations, then one triggered by the idle devices
        assert_eq!(
            summary,
            Summary { newest_sequence_id: SequenceId::new(3), devices: 1, epochs: 4 }
        );
    }

    #[tokio::test]
    async fn single_device_scenario_never_rotates() {
        let summary = run(&args(1, 0)).await.unwrap();

        assert_eq!(
            summary,
            Summary { newest_sequence_id: SequenceId::GENESIS, devices: 1, epochs: 1 }
        );
    }
}
