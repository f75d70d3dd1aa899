use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::process;
use std::sync::Arc;

use retune_core::{
    EpochRecord, JsonFileStore, LogSink, SinkRef, StateStore, Trainer, TrainingEventSink,
    TrainingSummary, TuneConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "retune",
    version,
    about = "Self-tuning HTTP load generator",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Train with defaults:            retune https://example.com
  Short run:                      retune https://example.com -n 100 -e 20
  Reproducible run:               retune https://example.com --seed 7
  Start from known parameters:    retune https://example.com --delay 0.5 --max-retries 3
  Resume a previous agent:        retune https://example.com --resume trained_agent.json
  From a config file:             retune -c retune.json
  Inspect a saved agent:          retune --show-state trained_agent.json
  Dry-run test:                   retune https://example.com --dry-run"
)]
pub struct Args {
    /// Target URL (defaults to the config file value)
    pub target: Option<String>,

    #[arg(short = 'c', long, help = "JSON config file; flags override its values")]
    pub config: Option<String>,

    #[arg(short = 'n', long, help = "Logical requests per epoch [default: 1000]")]
    pub requests: Option<usize>,

    #[arg(long, help = "Per-attempt timeout in seconds [default: 10]")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Maximum concurrent connections [default: 100]")]
    pub connections: Option<usize>,

    #[arg(short = 'e', long, help = "Number of training epochs [default: 200]")]
    pub epochs: Option<u32>,

    #[arg(long, help = "Agent learning rate in (0, 1] [default: 0.1]")]
    pub learning_rate: Option<f64>,

    #[arg(long, help = "Initial retry delay in seconds (random if omitted)")]
    pub delay: Option<f64>,

    #[arg(long, help = "Initial retry ceiling (random if omitted)")]
    pub max_retries: Option<u32>,

    #[arg(long, help = "Std-dev of the delay perturbation [default: 0.1]")]
    pub delay_noise: Option<f64>,

    #[arg(long, help = "Std-dev of the retry perturbation [default: 1.0]")]
    pub retries_noise: Option<f64>,

    #[arg(long, help = "Seed for reproducible runs")]
    pub seed: Option<u64>,

    #[arg(short = 'o', long = "state", help = "Where to save the trained agent [default: trained_agent.json]")]
    pub state_path: Option<String>,

    #[arg(long, help = "Resume training from a saved agent")]
    pub resume: Option<String>,

    #[arg(long, help = "Append one JSON line per epoch to this file")]
    pub history: Option<String>,

    #[arg(short = 'H', long = "header", help = "Custom header (e.g. \"Authorization: Bearer TOKEN\")")]
    pub headers: Vec<String>,

    #[arg(long, help = "Proxy URL (e.g. http://127.0.0.1:8080)")]
    pub proxy: Option<String>,

    #[arg(short = 'v', long, default_value_t = false, help = "Debug logging")]
    pub verbose: bool,

    #[arg(long, default_value_t = false, help = "Log records instead of drawing a progress bar")]
    pub plain: bool,

    #[arg(long, help = "Print a saved agent and exit")]
    pub show_state: Option<String>,

    #[arg(long, help = "Validate the configuration without sending requests")]
    pub dry_run: bool,
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprint!("{}\r\n", format!("[!] {:#}", e).red());
        process::exit(1);
    }
}

fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    if let Some(ref path) = args.show_state {
        init_logger(args.verbose);
        let state = JsonFileStore::new(path).load()?;
        print!("{}\r\n", format!("[+] Agent:         {}", path).green().bold());
        print!("{}\r\n", format!("[+] Delay:         {:.4}s", state.delay).blue());
        let retries = format!("{:.4} (~{})", state.max_retries, state.retry_ceiling());
        print!("{}\r\n", format!("[+] Max Retries:   {}", retries).blue());
        print!("{}\r\n", format!("[+] Learning Rate: {}", state.learning_rate).blue());
        std::io::stdout().flush().ok();
        return Ok(());
    }

    let config = build_config(&args)?;
    init_logger(config.verbose);
    let target = config.target_config()?;

    if config.dry_run {
        println!(
            "[DRY RUN] Would train against {} for {} epoch(s) of {} request(s)",
            target.url, config.epochs, target.request_count
        );
        return Ok(());
    }

    print_banner();
    print_run_config(&config);

    let sink: SinkRef = if args.plain {
        LogSink::new_ref()
    } else {
        ConsoleSink::new_ref(config.epochs)
    };

    let (mut trainer, store) = Trainer::from_config(&config, sink)?;
    trainer.run(&store).await?;
    Ok(())
}

/// Config file first, then command-line overrides.
fn build_config(args: &Args) -> anyhow::Result<TuneConfig> {
    let mut config = match args.config {
        Some(ref path) => TuneConfig::from_file(path)?,
        None => TuneConfig::default(),
    };

    if let Some(ref t) = args.target {
        config.target = t.clone();
    }
    if let Some(v) = args.requests {
        config.requests = v;
    }
    if let Some(v) = args.timeout {
        config.timeout = v;
    }
    if let Some(v) = args.connections {
        config.connections = v;
    }
    if let Some(v) = args.epochs {
        config.epochs = v;
    }
    if let Some(v) = args.learning_rate {
        config.learning_rate = v;
    }
    if args.delay.is_some() {
        config.initial_delay = args.delay;
    }
    if args.max_retries.is_some() {
        config.initial_max_retries = args.max_retries;
    }
    if let Some(v) = args.delay_noise {
        config.delay_noise = v;
    }
    if let Some(v) = args.retries_noise {
        config.retries_noise = v;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(ref v) = args.state_path {
        config.state_path = v.clone();
    }
    if args.resume.is_some() {
        config.resume_from = args.resume.clone();
    }
    if args.history.is_some() {
        config.history = args.history.clone();
    }
    if !args.headers.is_empty() {
        config.headers = args.headers.clone();
    }
    if let Some(ref v) = args.proxy {
        config.proxy = v.clone();
    }
    config.verbose |= args.verbose;
    config.dry_run |= args.dry_run;
    Ok(config)
}

fn print_banner() {
    print!("{}\r\n", "retune :: self-tuning load generator".bright_cyan().bold());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

fn print_run_config(config: &TuneConfig) {
    print!("{}\r\n", format!("[+] Target:      {}", config.target).green().bold());
    print!("{}\r\n", format!("[+] Requests:    {} per epoch", config.requests).blue());
    print!("{}\r\n", format!("[+] Connections: {}", config.connections).blue());
    print!("{}\r\n", format!("[+] Timeout:     {}s", config.timeout).blue());
    print!("{}\r\n", format!("[+] Epochs:      {}", config.epochs).magenta().bold());
    print!("{}\r\n", format!("[+] State:       {}", config.state_path).blue());
    if let Some(ref path) = config.resume_from {
        print!("{}\r\n", format!("[+] Resume:      {}", path).yellow());
    }
    if let Some(seed) = config.seed {
        print!("{}\r\n", format!("[+] Seed:        {}", seed).yellow());
    }
    if let Some(proxy) = config.proxy_ref() {
        print!("{}\r\n", format!("[+] Proxy:       {}", proxy).yellow());
    }
    if !config.headers.is_empty() {
        print!("{}\r\n", format!("[+] Headers:     {} custom", config.headers.len()).yellow());
    }
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

/// Terminal sink: one colored line per epoch above a progress bar.
struct ConsoleSink {
    bar: ProgressBar,
}

impl ConsoleSink {
    fn new_ref(epochs: u32) -> SinkRef {
        let bar = ProgressBar::new(u64::from(epochs));
        let template = "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} epochs ({eta})";
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Arc::new(Self { bar })
    }
}

impl TrainingEventSink for ConsoleSink {
    fn on_epoch(&self, r: &EpochRecord) {
        let reward = format!("{:.2}", r.reward);
        let reward = if r.reward >= 0.9 {
            reward.green()
        } else if r.reward > 0.0 {
            reward.yellow()
        } else {
            reward.red()
        };
        let line = format!(
            "[*] Epoch {}/{} | Delay: {:.2}s | Max Retries: {} | Success: {}/{} | Reward: {} | {}ms",
            r.epoch,
            r.epochs,
            r.delay,
            r.max_retries,
            r.success_count,
            r.request_count,
            reward,
            r.elapsed_ms
        );
        // A hidden bar (no terminal) swallows println.
        if self.bar.is_hidden() {
            print!("{}\r\n", line);
            std::io::stdout().flush().ok();
        } else {
            self.bar.println(line);
        }
        self.bar.inc(1);
    }

    fn on_summary(&self, s: &TrainingSummary) {
        self.bar.finish_and_clear();
        print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
        print!("{}\r\n", "[+] Training completed.".green().bold());
        print!("{}\r\n", format!(
            "    Final Policy: Delay {:.2}s | Max Retries {}",
            s.final_state.delay,
            s.final_state.retry_ceiling()
        ).bright_white());
        print!("{}\r\n", format!("    Mean Reward:  {:.3}", s.mean_reward).cyan());
        if let Some(best) = s.best_epoch {
            print!("{}\r\n", format!("    Best Epoch:   {} (reward {:.3})", best, s.best_reward).cyan());
        }
        print!("{}\r\n", format!("    Saved To:     {}", s.state_path).dimmed());
        std::io::stdout().flush().ok();
    }
}
