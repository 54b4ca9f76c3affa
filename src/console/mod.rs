mod input;
mod render;

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::ansi;
use crate::backend::BackendClient;
use crate::config::Config;
use crate::disposition::submitter::DispositionSubmitter;
use crate::session::{CallSession, SessionEvent};

use input::Input;

/// Entry point for `agent-console --console`: an interactive agent console
/// driving one call at a time through the backend proxy.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let backend_url = config.console.backend_url.clone();
    let (events_tx, mut events) = mpsc::channel(8);
    let session = CallSession::new(
        Arc::new(BackendClient::new(&backend_url)),
        Arc::new(DispositionSubmitter::new(&backend_url)),
        config.polling.clone(),
        events_tx,
    );

    println!();
    println!("  {}", ansi::bold("Agent console"));
    println!("  {}", ansi::dim(&format!("Backend: {backend_url}")));
    println!("  {}", ansi::dim("Type `help` for commands"));
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match input::parse(&line) {
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(input)) => handle(&session, input).await,
                    Ok(None) => {}
                    Err(e) => println!("  {} {e}", ansi::yellow("!")),
                }
                prompt();
            }
            Some(SessionEvent::Ended(call)) = events.recv() => {
                println!();
                println!("  {} Call ended", ansi::bold(">>"));
                println!("{}", render::call_summary(&call));
                println!();
                println!("  {}", ansi::bold("Disposition"));
                println!("{}", render::codes());
                println!("  {}", ansi::dim("dispose <code|#> <notes>, or `cancel` to discard"));
                prompt();
            }
        }
    }

    session.reset().await;
    Ok(())
}

/// Run one parsed input. Anything that goes over the network runs in its own
/// task so the prompt stays usable (e.g. `reset` while a call is still
/// connecting).
async fn handle(session: &CallSession, input: Input) {
    match input {
        Input::Dial {
            phone_number,
            customer_name,
        } => {
            println!("  {}", ansi::dim(&format!("Calling {phone_number}...")));
            let session = session.clone();
            tokio::spawn(async move {
                match session.initiate(&phone_number, &customer_name).await {
                    Ok(call) => {
                        println!();
                        println!("  {} Call active", ansi::green("\u{2713}"));
                        println!("{}", render::call_summary(&call));
                    }
                    Err(e) => println!("\n{}", render::error(&e)),
                }
                prompt();
            });
        }
        Input::Command(command) => {
            let kind = command.kind();
            let session = session.clone();
            tokio::spawn(async move {
                match session.send_command(command).await {
                    // The Ended event prints the summary.
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        println!("\n  {} {kind} sent", ansi::green("\u{2713}"));
                        prompt();
                    }
                    Err(e) => {
                        println!("\n{}", render::error(&e));
                        prompt();
                    }
                }
            });
        }
        Input::Dispose { disposition, notes } => {
            let session = session.clone();
            tokio::spawn(async move {
                match session.submit_disposition(&disposition, &notes).await {
                    Ok(receipt) => {
                        println!("\n{}", render::receipt(&receipt));
                        println!("  {}", ansi::dim("Ready for the next call"));
                    }
                    Err(e) => println!("\n{}", render::error(&e)),
                }
                prompt();
            });
        }
        Input::Status => {
            println!("{}", render::snapshot(&session.snapshot().await));
            if session.pending_disposition().await.is_some() {
                println!("  {}", ansi::dim("Awaiting disposition: dispose <code|#> <notes>"));
            }
        }
        Input::Codes => println!("{}", render::codes()),
        Input::Cancel => match session.cancel_disposition().await {
            Ok(()) => println!("  {}", ansi::dim("Disposition discarded")),
            Err(e) => println!("{}", render::error(&e)),
        },
        Input::Reset => {
            session.reset().await;
            println!("  {}", ansi::dim("Session reset"));
        }
        Input::Help => {
            for (usage, what) in input::HELP {
                println!("  {:<38} {}", ansi::cyan(usage), ansi::dim(what));
            }
        }
        Input::Quit => {}
    }
}

fn prompt() {
    print!("{} ", ansi::bold(">"));
    let _ = std::io::stdout().flush();
}
