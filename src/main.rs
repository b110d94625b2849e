//! RPS Signed Moves CLI
//!
//! Probe the signing backends, sign and verify single moves, or play a local
//! demo match whose rounds are all signed and checked.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rps_moves::{
    game::{ledger::MatchLedger, moves::Move, scoreboard::SharedScoreBoard},
    network::scoreboard::{self, render_scores, ScoreboardConfig, DEFAULT_BIND},
    signing::{
        local_key::AllowedSigners,
        probe::{probe, SystemEnvironment},
        Backend, MoveAssertion, RecordVerifier, SignedMoveRecord, SigningBackend, SigningConfig,
        SigningMethod, VerificationOutcome,
    },
    VERSION,
};

#[derive(Debug, Parser)]
#[command(name = "rps-moves", version, about = "Signed rock-paper-scissors moves")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the signing backend this machine can use.
    Probe,
    /// Sign one move and print the record as JSON.
    Sign {
        #[command(flatten)]
        assertion: AssertionArgs,
        #[command(flatten)]
        signing: SigningArgs,
    },
    /// Verify a record file. Exits non-zero unless verified.
    Verify {
        /// Record JSON file.
        #[arg(long)]
        record: PathBuf,
        /// allowed_signers file for SSH records.
        #[arg(long)]
        allowed_signers: Option<PathBuf>,
    },
    /// Print the canonical payload bytes of a move.
    Payload {
        #[command(flatten)]
        assertion: AssertionArgs,
    },
    /// Play a local demo match; both sides sign every round.
    Play {
        /// Our identity.
        #[arg(long)]
        identity: String,
        /// Opponent identity.
        #[arg(long)]
        opponent: String,
        /// Number of rounds.
        #[arg(long, default_value_t = 3)]
        rounds: u64,
        /// Match id (random UUID if omitted).
        #[arg(long)]
        match_id: Option<String>,
        /// Seed for the move picker.
        #[arg(long)]
        seed: Option<u64>,
        #[command(flatten)]
        signing: SigningArgs,
        /// allowed_signers file (defaults to the key's .pub for both sides).
        #[arg(long)]
        allowed_signers: Option<PathBuf>,
        /// Write the match ledger as JSON lines.
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Serve an empty scoreboard over HTTP.
    ServeScores {
        /// Listen address (overrides RPS_SCOREBOARD_BIND).
        #[arg(long)]
        bind: Option<String>,
        /// Server identity (overrides RPS_SERVER_SPIFFE_ID).
        #[arg(long)]
        server_id: Option<String>,
    },
}

#[derive(Debug, clap::Args)]
struct AssertionArgs {
    /// rock, paper or scissors.
    #[arg(long = "move")]
    mv: Move,
    /// Match id.
    #[arg(long)]
    match_id: String,
    /// Round number.
    #[arg(long)]
    round: u64,
    /// Signer identity (SPIFFE ID).
    #[arg(long)]
    identity: String,
}

impl AssertionArgs {
    fn assertion(&self) -> MoveAssertion {
        MoveAssertion::new(self.mv, &self.match_id, self.round, &self.identity)
    }
}

#[derive(Debug, clap::Args)]
struct SigningArgs {
    /// Backend to use.
    #[arg(long, value_enum, default_value_t = MethodArg::Auto)]
    method: MethodArg,
    /// SSH private key (overrides RPS_SSH_KEY).
    #[arg(long)]
    key: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    Sigstore,
    Ssh,
    None,
    Auto,
}

impl SigningArgs {
    fn config(&self) -> SigningConfig {
        let mut config = SigningConfig::from_env();
        if let Some(key) = &self.key {
            config.default_key = key.clone();
        }
        config
    }

    fn backend(&self, config: &SigningConfig) -> Backend {
        let method = match self.method {
            MethodArg::Sigstore => SigningMethod::KeylessTransparency,
            MethodArg::Ssh => SigningMethod::LocalKey,
            MethodArg::None => SigningMethod::Unsigned,
            MethodArg::Auto => probe(&SystemEnvironment::new(config.clone())),
        };
        Backend::for_method(method, config.clone())
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Probe => {
            let method = probe(&SystemEnvironment::new(SigningConfig::from_env()));
            println!("{method}");
        }
        Command::Sign { assertion, signing } => {
            let config = signing.config();
            let record = signing
                .backend(&config)
                .sign(&assertion.assertion())
                .context("signing failed")?;
            println!("{}", record.to_json()?);
        }
        Command::Verify { record, allowed_signers } => {
            let text = std::fs::read_to_string(&record)
                .with_context(|| format!("reading {}", record.display()))?;
            let record = SignedMoveRecord::from_json(&text).context("decoding record")?;
            let signers = load_signers(allowed_signers.as_deref())?;
            let outcome = RecordVerifier::new(SigningConfig::from_env(), signers).verify(&record)?;
            println!("{outcome}");
            if !outcome.is_verified() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Payload { assertion } => {
            println!("{}", assertion.assertion().payload().as_str());
        }
        Command::Play {
            identity,
            opponent,
            rounds,
            match_id,
            seed,
            signing,
            allowed_signers,
            ledger,
        } => {
            let game = DemoMatch {
                identity,
                opponent,
                rounds,
                match_id: match_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                seed,
            };
            game.run(&signing, allowed_signers.as_deref(), ledger.as_deref())?;
        }
        Command::ServeScores { bind, server_id } => {
            let mut config = ScoreboardConfig::from_env()?;
            if let Some(bind) = bind {
                config.bind = scoreboard::parse_bind(&bind)?;
            }
            if let Some(id) = server_id {
                config.server_spiffe_id = id;
            }
            info!("rps-moves v{} (default bind {})", VERSION, DEFAULT_BIND);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(scoreboard::serve(config, SharedScoreBoard::default()))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn load_signers(path: Option<&Path>) -> Result<AllowedSigners> {
    match path {
        Some(path) => AllowedSigners::load(path).with_context(|| format!("reading {}", path.display())),
        None => Ok(AllowedSigners::new()),
    }
}

/// Both sides of a match played locally with the same backend.
struct DemoMatch {
    identity: String,
    opponent: String,
    rounds: u64,
    match_id: String,
    seed: Option<u64>,
}

impl DemoMatch {
    fn run(&self, signing: &SigningArgs, allowed: Option<&Path>, ledger_out: Option<&Path>) -> Result<()> {
        let config = signing.config();
        let backend = signing.backend(&config);
        let signers = match allowed {
            Some(path) => load_signers(Some(path))?,
            None if backend.method() == SigningMethod::LocalKey => {
                self.signers_from_key(&config.resolved_default_key())?
            }
            None => AllowedSigners::new(),
        };
        let verifier = RecordVerifier::new(config, signers);
        let board = SharedScoreBoard::default();
        let mut ledger = MatchLedger::new(&self.match_id);
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!("match {} using {}", self.match_id, backend.method());
        for round in 1..=self.rounds {
            let mine = MoveAssertion::new(Move::random(&mut rng), &self.match_id, round, &self.identity);
            let theirs = MoveAssertion::new(Move::random(&mut rng), &self.match_id, round, &self.opponent);

            let mut rejected = false;
            for assertion in [mine, theirs] {
                let record = backend.sign(&assertion)?;
                let outcome = verifier.verify(&record)?;
                if outcome == VerificationOutcome::Rejected {
                    warn!("round {} move of {} rejected", round, record.signer_identity);
                    rejected = true;
                }
                ledger.insert(record)?;
            }
            if rejected {
                continue;
            }

            let Some(outcome) = ledger.outcome(round, &self.identity, &self.opponent) else {
                bail!("round {round} incomplete");
            };
            if let Some((a, b)) = ledger.round_pair(round, &self.identity, &self.opponent) {
                println!("round {round}: {} vs {} -> {outcome:?}", a.mv, b.mv);
            }
            board.blocking_record(&self.opponent, outcome);
        }

        let scores = render_scores(&ScoreboardConfig::default(), board.blocking_snapshot());
        println!("{}", serde_json::to_string_pretty(&scores)?);

        if let Some(path) = ledger_out {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            ledger.export_jsonl(BufWriter::new(file))?;
            info!("ledger written to {}", path.display());
        }
        Ok(())
    }

    fn signers_from_key(&self, key: &Path) -> Result<AllowedSigners> {
        let mut public_path = key.as_os_str().to_owned();
        public_path.push(".pub");
        let public_path = PathBuf::from(public_path);
        let text = std::fs::read_to_string(&public_path)
            .with_context(|| format!("reading {}", public_path.display()))?;
        let public_key: Vec<&str> = text.split_whitespace().take(2).collect();
        if public_key.len() != 2 {
            bail!("{} is not an OpenSSH public key", public_path.display());
        }
        let public_key = public_key.join(" ");
        let mut signers = AllowedSigners::new();
        signers.insert(self.identity.clone(), public_key.clone());
        signers.insert(self.opponent.clone(), public_key);
        Ok(signers)
    }
}
