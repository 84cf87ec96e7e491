use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use thiserror::Error;
use zeroize::Zeroize;

use tee_aes_ctr::crypto::utils::{hex_to_block, UtilError};
use tee_aes_ctr::crypto::{encrypt_aes_ctr, AES_BLOCK_SIZE};
use tee_aes_ctr::{ClientConfig, ConfigError, SecureChannel, Session, SoftTee, StreamState, TeeError};

#[derive(Parser, Debug)]
#[command(name = "tee-aes-ctr", version, about = "AES-CTR decryption through a TEE trusted application")]
struct Cli {
    /// Use the in-process software backend even when built with `optee`
    #[arg(long, global = true)]
    soft: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decrypt a file chunk by chunk
    Decrypt {
        /// AES-128 key, 32 hex characters
        #[arg(long)]
        key: String,
        /// Initial counter block, 32 hex characters
        #[arg(long)]
        iv: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Bytes read and submitted per call
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,
    },
    /// Decrypt a random message in random chunks and compare with software AES-CTR
    Selftest {
        #[arg(long, default_value_t = 100_000)]
        len: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tee(#[from] TeeError),
    #[error("Invalid argument: {0}")]
    Argument(#[from] UtilError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("--chunk-size must be between 1 and {max}, got {actual}")]
    ChunkSize { max: usize, actual: usize },
    #[error("Self-test mismatch at byte {0}")]
    Mismatch(usize),
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cli = Cli::parse();
    let result = ClientConfig::from_env()
        .map_err(CliError::from)
        .and_then(|config| dispatch(&cli, config));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "optee")]
fn dispatch(cli: &Cli, config: ClientConfig) -> Result<(), CliError> {
    if cli.soft {
        return run_soft(&cli.command, config);
    }
    log::info!("Using OP-TEE backend");
    run(
        &cli.command,
        Session::new(tee_aes_ctr::tee::optee::OpteeChannel::new(), config),
    )
}

#[cfg(not(feature = "optee"))]
fn dispatch(cli: &Cli, config: ClientConfig) -> Result<(), CliError> {
    if !cli.soft {
        log::info!("Built without `optee`; using the software backend");
    }
    run_soft(&cli.command, config)
}

fn run_soft(command: &Command, config: ClientConfig) -> Result<(), CliError> {
    let mut soft = SoftTee::with_identity(config.ta_uuid, config.command_id);
    let result = run(command, Session::new(&mut soft, config));
    let stats = soft.stats();
    log::debug!(
        "soft TEE: {} invocations, {} bytes submitted, {} live blocks",
        stats.invocations,
        stats.submitted.iter().sum::<usize>(),
        soft.live_allocations()
    );
    result
}

fn run<C: SecureChannel>(command: &Command, mut session: Session<C>) -> Result<(), CliError> {
    let result = match command {
        Command::Decrypt {
            key,
            iv,
            input,
            output,
            chunk_size,
        } => decrypt_file(&mut session, key, iv, input, output, *chunk_size),
        Command::Selftest { len, seed } => selftest(&mut session, *len, *seed),
    };
    session.close()?;
    result
}

fn decrypt_file<C: SecureChannel>(
    session: &mut Session<C>,
    key_hex: &str,
    iv_hex: &str,
    input: &Path,
    output: &Path,
    chunk_size: usize,
) -> Result<(), CliError> {
    let max = session.capacity() - (AES_BLOCK_SIZE - 1);
    if chunk_size == 0 || chunk_size > max {
        return Err(CliError::ChunkSize {
            max,
            actual: chunk_size,
        });
    }

    let mut key = hex_to_block(key_hex)?;
    let iv = hex_to_block(iv_hex)?;

    let mut reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(output)?);
    let mut state = StreamState::new(iv);
    let mut buf = vec![0u8; chunk_size];
    let mut out = vec![0u8; chunk_size];
    let mut total = 0usize;

    let result = (|| -> Result<(), CliError> {
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            let written = session.decrypt_into(&buf[..n], &key, &mut state, &mut out)?;
            writer.write_all(&out[..written])?;
            total += written;
        }
        writer.flush()?;
        Ok(())
    })();

    key.zeroize();
    out.zeroize();
    result?;

    log::info!("Decrypted {} bytes to {}", total, output.display());
    Ok(())
}

fn selftest<C: SecureChannel>(
    session: &mut Session<C>,
    len: usize,
    seed: Option<u64>,
) -> Result<(), CliError> {
    let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
    log::info!("Self-test: {} bytes, seed {}", len, seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut key = [0u8; 16];
    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut key);
    rng.fill_bytes(&mut iv);
    let mut plaintext = vec![0u8; len];
    rng.fill_bytes(&mut plaintext);
    let ciphertext = encrypt_aes_ctr(&plaintext, &key, &iv);

    let max_chunk = session.capacity() - (AES_BLOCK_SIZE - 1);
    let mut state = StreamState::new(iv);
    let mut decrypted = Vec::with_capacity(len);
    let mut pos = 0;
    let mut calls = 0usize;
    while pos < len {
        let n = rng.gen_range(1..=max_chunk.min(len - pos));
        decrypted.extend(session.decrypt(&ciphertext[pos..pos + n], &key, &mut state)?);
        pos += n;
        calls += 1;
    }

    if let Some(i) = decrypted.iter().zip(&plaintext).position(|(a, b)| a != b) {
        return Err(CliError::Mismatch(i));
    }
    if decrypted.len() != plaintext.len() {
        return Err(CliError::Mismatch(decrypted.len().min(plaintext.len())));
    }

    println!("ok: {} bytes in {} calls (seed {})", len, calls, seed);
    Ok(())
}
