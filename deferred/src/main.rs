mod host;
mod interrupt;
mod logging;
mod options;
mod retry;
mod timer;

use anyhow::{bail, Context as _, Result};
use clap::{CommandFactory as _, Parser, Subcommand};
use deferred_core::{combinators, Deferred, State, Value};
use host::Host;
use options::Options;
use retry::RetryPolicy;
use serde_json::json;
use std::{process::exit, time::Duration};

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

/// Print the error and exit; 130 when the run was cut short by an interrupt.
fn handle_result(r: Result<()>) {
    if let Err(e) = r {
        eprintln!("deferred error: {:?}", e);
        exit(exit_code(&e));
    }
}

fn exit_code(e: &anyhow::Error) -> i32 {
    if e.is::<interrupt::InterruptedError>() {
        130
    } else {
        1
    }
}

fn run_args(args: Args) -> Result<()> {
    let mut logging = logging::set_up(&logging::Options {
        verbose: args.options.verbose,
        color: args.options.use_color(),
    })?;
    let r = run_command(&args);
    logging.tear_down()?;
    r
}

fn run_command(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Delay(subargs) => {
            let value = parse_value(&subargs.value)?;
            let ms = subargs.ms;
            drive("delay", move |host| {
                timer::delay(host, Duration::from_millis(ms), value)
            })
        }
        Commands::Retry(subargs) => {
            let subargs = subargs.clone();
            drive("retry", move |host| {
                let policy = RetryPolicy {
                    max_retries: subargs.max_retries,
                    delay: Duration::from_millis(subargs.delay_ms),
                };
                let attempt_time = Duration::from_millis(subargs.attempt_ms);
                let failures = subargs.failures;
                let host2 = host.clone();
                retry::retry(host, policy, move |n| {
                    if n < failures {
                        timer::delay_reject(
                            &host2,
                            attempt_time,
                            format!("attempt {} failed", n).into(),
                        )
                    } else {
                        timer::delay(&host2, attempt_time, n.into())
                    }
                })
            })
        }
        Commands::Race(timers) => {
            let timers = timers.clone();
            drive("race", move |host| {
                combinators::race(&host.scheduler(), timers.deferreds(host))
            })
        }
        Commands::All(timers) => {
            let timers = timers.clone();
            drive("all", move |host| {
                combinators::all(&host.scheduler(), timers.deferreds(host))
            })
        }
        Commands::Conformance { json } => {
            let _span = tracing::info_span!("conformance").entered();
            let report = deferred_aplus::suite::run_all();
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
            if !report.is_success() {
                bail!("{} conformance case(s) failed", report.failures().count());
            }
            Ok(())
        }
        Commands::GenerateMan => (|| {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        })(),
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "deferred", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Build a deferred on a fresh host, run until no timers are left, and print
/// how it settled.
fn drive(name: &str, main: impl FnOnce(&Host) -> Deferred) -> Result<()> {
    let _span = tracing::info_span!("command", name).entered();
    let interrupt_state = interrupt::set_up_process_interrupt_handler();
    let host = Host::new(interrupt_state.clone());
    let state = host::block_on(async move { host.run(main).await.state() })?;
    report(state)?;
    interrupt_state.check_interrupted()
}

fn report(state: State) -> Result<()> {
    let (output, rejection) = match state {
        State::Fulfilled(value) => (
            json!({ "status": "fulfilled", "value": value.to_json() }),
            None,
        ),
        State::Rejected(reason) => (
            json!({ "status": "rejected", "reason": reason.to_json() }),
            Some(reason),
        ),
        State::Pending => bail!("deferred never settled"),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    match rejection {
        Some(reason) => bail!("deferred was rejected: {}", reason),
        None => Ok(()),
    }
}

fn parse_value(s: &str) -> Result<Value> {
    let json: serde_json::Value =
        serde_json::from_str(s).with_context(|| format!("parsing value as JSON: {}", s))?;
    Ok(json.into())
}

/// Deferred computations: drive them against real timers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(clap::Args, Debug, Clone)]
struct DelayArgs {
    /// Milliseconds until the deferred fulfills
    #[arg(long, default_value_t = 100)]
    ms: u64,

    /// The fulfillment value, as JSON
    #[arg(long, default_value = "null")]
    value: String,
}

#[derive(clap::Args, Debug, Clone)]
struct RetryArgs {
    /// How many attempts fail before one succeeds
    #[arg(long, default_value_t = 2)]
    failures: u32,

    /// Attempts after the first one before giving up
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Milliseconds to wait between attempts
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    /// Milliseconds each attempt takes
    #[arg(long, default_value_t = 10)]
    attempt_ms: u64,
}

#[derive(clap::Args, Debug, Clone)]
struct TimerArgs {
    /// Timers that fulfill with their delay after that many milliseconds
    #[arg(value_name = "MS")]
    fulfill: Vec<u64>,

    /// Timers that reject with their delay after that many milliseconds
    #[arg(long, value_name = "MS")]
    reject: Vec<u64>,
}

impl TimerArgs {
    /// Fulfilling timers first, then rejecting ones, each in argument order.
    fn deferreds(&self, host: &Host) -> Vec<Value> {
        let fulfilled = self
            .fulfill
            .iter()
            .map(|&ms| timer::delay(host, Duration::from_millis(ms), ms.into()));
        let rejected = self
            .reject
            .iter()
            .map(|&ms| timer::delay_reject(host, Duration::from_millis(ms), ms.into()));
        fulfilled.chain(rejected).map(Value::from).collect()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wait, then print the given value
    Delay(DelayArgs),

    /// Retry a simulated flaky operation until it succeeds
    Retry(RetryArgs),

    /// Settle like the first timer to settle
    Race(TimerArgs),

    /// Collect the values of all timers, or the first rejection
    All(TimerArgs),

    /// Run the Promises/A+ conformance cases
    Conformance {
        /// Print the per-case results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate markdown documentation for deferred
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for deferred
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for deferred
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use interrupt::InterruptState;

    #[test]
    fn cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_timer_lists() {
        let args = Args::try_parse_from(["deferred", "race", "30", "10", "--reject", "5"]).unwrap();
        match args.command {
            Commands::Race(t) => {
                assert_eq!(t.fulfill, vec![30, 10]);
                assert_eq!(t.reject, vec![5]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn values_are_json() {
        assert_eq!(parse_value("[1, \"a\"]").unwrap(), Value::List(vec![1.into(), "a".into()]));
        assert!(parse_value("{oops").is_err());
    }

    #[test]
    fn interruption_exits_with_130() {
        let interrupt_state = InterruptState::new();
        interrupt_state.set_interrupted();
        let e = interrupt_state.check_interrupted().unwrap_err();
        assert_eq!(exit_code(&e), 130);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn rejected_outcome_is_an_error() {
        assert!(report(State::Fulfilled(1.into())).is_ok());
        let err = report(State::Rejected("nope".into())).unwrap_err();
        assert_eq!(err.to_string(), "deferred was rejected: nope");
        assert!(report(State::Pending).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_args_build_one_deferred_each() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let host = Host::new(InterruptState::new());
                let timers = TimerArgs {
                    fulfill: vec![20, 10],
                    reject: vec![30],
                };
                let d = host
                    .run(|host| combinators::all_settled(&host.scheduler(), timers.deferreds(host)))
                    .await;
                let State::Fulfilled(Value::List(results)) = d.state() else {
                    panic!("unexpected state {:?}", d.state());
                };
                assert_eq!(results.len(), 3);
            })
            .await;
    }
}
