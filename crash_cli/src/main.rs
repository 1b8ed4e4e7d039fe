use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use crash_client::simulator::STARTING_CREDITS;
use crash_client::{
    play_round, run_autoplay, AutoPlayPlan, ClientConfig, CrashCheck, GameServerApi, GameSession,
    HttpGameServer, RoundResolution, SimulatedServer, TokioClock,
};
use crash_core::{
    derive_hash_hex, AutoCashout, ChartAccumulator, CoinFace, GameType, Outcome,
    ProvablyFairSeeds, RoundId,
};

#[derive(Parser)]
#[command(name = "crash-cli", about = "Play and verify crash and coinflip rounds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Game server base URL
    #[arg(long, env = "BACKEND_URL")]
    backend_url: Option<String>,
    /// Bearer token for the game server
    #[arg(long, env = "CRASH_API_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Play against an in-process simulated server
    #[arg(long)]
    offline: bool,
    /// Starting credits in offline mode
    #[arg(long, default_value_t = STARTING_CREDITS)]
    credits: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one crash round. Without --auto-cashout, press Enter to cash out
    Play {
        #[arg(long)]
        bet: f64,
        #[arg(long)]
        auto_cashout: Option<f64>,
        /// Write the round's multiplier samples to a CSV file
        #[arg(long)]
        chart_csv: Option<PathBuf>,
    },
    /// Play several rounds unattended; Ctrl-C stops between rounds
    Autoplay {
        #[arg(long)]
        games: u32,
        #[arg(long, default_value_t = 2.0)]
        delay: f64,
        #[arg(long)]
        bet: f64,
        #[arg(long)]
        auto_cashout: Option<f64>,
    },
    Coinflip {
        #[arg(long)]
        bet: f64,
        #[arg(long)]
        guess: CoinFace,
    },
    /// Recompute an outcome from its seeds, without contacting the server
    Verify {
        #[arg(long)]
        server_seed: String,
        #[arg(long)]
        client_seed: String,
        #[arg(long)]
        nonce: String,
        #[arg(long, default_value = "crash")]
        game: GameType,
        /// Outcome the server reported: a multiplier or heads/tails
        #[arg(long)]
        reported: Option<String>,
    },
    /// Fetch a finished round's seeds from the server and check them
    VerifyRound { id: i64 },
    /// Print the commitment hash of a server seed
    Hash { server_seed: String },
    History {
        #[arg(short, default_value_t = 20)]
        n: usize,
    },
    Recent,
    Stats,
}

fn auto_cashout(threshold: Option<f64>) -> AutoCashout {
    threshold.map(AutoCashout::at).unwrap_or_default()
}

fn parse_reported(game: GameType, raw: &str) -> anyhow::Result<Outcome> {
    Ok(match game {
        GameType::Crash => Outcome::Crash {
            multiplier: raw
                .trim()
                .trim_end_matches(['x', 'X'])
                .parse()
                .with_context(|| format!("reported multiplier '{raw}' is not a number"))?,
        },
        GameType::Coinflip => Outcome::Coinflip { face: raw.parse()? },
    })
}

fn verify_offline(
    server_seed: &str,
    client_seed: &str,
    nonce: &str,
    game: GameType,
    reported: Option<&str>,
) -> anyhow::Result<()> {
    let seeds = ProvablyFairSeeds::parse(server_seed, client_seed, nonce)?;
    let outcome = seeds.outcome(game);
    println!("server seed hash: {}", seeds.server_seed_hash_hex());
    println!("outcome:          {outcome}");
    if let Some(raw) = reported {
        let reported = parse_reported(game, raw)?;
        let ok = crash_core::verify(&reported, server_seed, client_seed, seeds.nonce, game)?;
        if ok {
            println!("reported {reported}: verified");
        } else {
            println!("reported {reported}: MISMATCH, recomputed {outcome}");
        }
    }
    Ok(())
}

fn write_chart_csv(chart: &ChartAccumulator, path: &Path) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    for sample in chart {
        wtr.serialize(sample)?;
    }
    wtr.flush()?;
    println!("Exported {} samples to {}", chart.len(), path.display());
    Ok(())
}

/// Resolves on the first line read from stdin. A closed stdin never resolves.
/// The read runs on a detached thread so a pending read does not hold the
/// runtime open at exit.
fn enter_pressed() -> impl Future<Output = ()> {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        if matches!(std::io::stdin().read_line(&mut line), Ok(n) if n > 0) {
            let _ = tx.send(());
        }
    });
    async move {
        if rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn print_resolution(resolution: &RoundResolution) {
    match resolution {
        RoundResolution::Won {
            round_id,
            cashed_out_at,
            winnings,
            ..
        } => println!("round {round_id}: cashed out at {cashed_out_at:.2}x, won {winnings:.2}"),
        RoundResolution::Crashed {
            round_id,
            crash_multiplier,
            rejected_cashout,
            check,
        } => {
            match rejected_cashout {
                Some(requested) => println!(
                    "round {round_id}: crashed at {crash_multiplier:.2}x before the cashout at {requested:.2}x landed"
                ),
                None => println!("round {round_id}: crashed at {crash_multiplier:.2}x"),
            }
            if let Some(check) = check {
                print_check(check);
            }
        }
    }
}

fn print_check(check: &CrashCheck) {
    if !check.consistent {
        if let Some(server) = check.server_crash_multiplier {
            println!("  server recorded the crash at {server:.2}x");
        }
    }
    if check.commitment_ok == Some(false) {
        println!("  revealed server seed does NOT match its commitment");
    }
    if check.fair == Some(false) {
        println!("  crash point does NOT verify against the revealed seeds");
    }
}

async fn run<A: GameServerApi>(
    command: Commands,
    mut session: GameSession<A, TokioClock>,
) -> anyhow::Result<()> {
    match command {
        Commands::Play {
            bet,
            auto_cashout: threshold,
            chart_csv,
        } => {
            let auto = auto_cashout(threshold);
            if !auto.is_armed() {
                println!("Round running, press Enter to cash out");
            }
            let result = play_round(&mut session, bet, auto, enter_pressed()).await;
            if let Some(path) = chart_csv {
                write_chart_csv(session.chart(), &path)?;
            }
            print_resolution(&result?);
            if let Some(balance) = session.balance() {
                println!("balance: {balance:.2}");
            }
        }
        Commands::Autoplay {
            games,
            delay,
            bet,
            auto_cashout: threshold,
        } => {
            let plan = AutoPlayPlan {
                games,
                delay_seconds: delay,
                bet_amount: bet,
                auto_cashout: auto_cashout(threshold),
            };
            let done = run_autoplay(
                &mut session,
                plan,
                |p| {
                    print!("[{}/{}] ", p.completed, p.total);
                    match &p.resolution {
                        Some(r) => print_resolution(r),
                        None => println!("round {} failed", p.round_number),
                    }
                },
                ctrl_c(),
            )
            .await?;
            println!(
                "auto play: {} of {} games, {} won, {} lost, {} failed",
                done.completed, done.total, done.wins, done.losses, done.failures
            );
        }
        Commands::Coinflip { bet, guess } => {
            let report = session.play_coinflip(bet, guess).await?;
            let result = match &report.round.kind {
                crash_core::RoundKind::Coinflip { result, win, .. } => {
                    format!("{result} ({})", if *win { "win" } else { "loss" })
                }
                crash_core::RoundKind::Crash { .. } => "unexpected crash round".to_string(),
            };
            println!("coin: {result}, credits {:.2}", report.credits);
            match report.verified {
                Some(true) => println!("verified against revealed seeds"),
                Some(false) => println!("VERIFICATION FAILED"),
                None => println!("server did not reveal seeds"),
            }
        }
        Commands::VerifyRound { id } => {
            let report = session.verify_round(RoundId(id)).await?;
            println!("server seed: {}", report.server_seed);
            println!("client seed: {}", report.client_seed);
            println!("nonce:       {}", report.nonce);
            println!("reported:    {}", report.reported);
            println!("recomputed:  {}", report.recomputed);
            println!(
                "result:      {}{}",
                if report.matches { "verified" } else { "MISMATCH" },
                if report.server_says_fair { "" } else { " (server reports unfair)" }
            );
        }
        Commands::History { n } => {
            let (rounds, summary) = session.history().await?;
            for r in rounds.iter().take(n) {
                let cashed = r
                    .cashed_out_at
                    .map(|m| format!("{m:.2}x"))
                    .unwrap_or_else(|| "-".into());
                let crashed = r
                    .crashed_at
                    .map(|m| format!("{m:.2}x"))
                    .unwrap_or_else(|| "live".into());
                println!(
                    "#{:>6} {} bet={:.2} cashed={} crash={}",
                    r.id,
                    r.created_at.format("%Y-%m-%d %H:%M:%S"),
                    r.bet_amount,
                    cashed,
                    crashed
                );
            }
            println!(
                "{} rounds, {} won, {} lost, win rate {:.1}%, net {:.2}",
                summary.total, summary.wins, summary.losses, summary.win_rate, summary.net
            );
        }
        Commands::Recent => {
            let recent = session.recent_crashes().await?;
            let line: Vec<String> = recent.iter().map(|m| format!("{m:.2}x")).collect();
            println!("{}", line.join(" "));
        }
        Commands::Stats => {
            let s = session.stats().await?;
            println!(
                "rounds:        {} ({} cashed out, {} crashed)",
                s.total_rounds, s.cashed_out_rounds, s.crashed_rounds
            );
            println!("win rate:      {:.1}%", s.win_rate);
            println!("total bet:     {:.2}", s.total_bet);
            println!("total won:     {:.2}", s.total_won);
            println!("rtp:           {:.2}%", s.rtp);
            println!("average crash: {:.2}x", s.average_crash);
            println!("highest win:   {:.2}", s.highest_win);
            println!("profit:        {:.2}", s.profit);
        }
        Commands::Verify {
            server_seed,
            client_seed,
            nonce,
            game,
            reported,
        } => verify_offline(&server_seed, &client_seed, &nonce, game, reported.as_deref())?,
        Commands::Hash { server_seed } => println!("{}", derive_hash_hex(server_seed.as_bytes())),
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.backend_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if cli.token.is_some() {
        config.token = cli.token;
    }

    let clock = TokioClock::new();
    if cli.offline {
        let server = SimulatedServer::new(clock, cli.credits);
        let session = GameSession::new(server, clock, &config).with_balance(cli.credits);
        run(cli.command, session).await
    } else {
        let server = HttpGameServer::new(&config)?;
        run(cli.command, GameSession::new(server, clock, &config)).await
    }
}
