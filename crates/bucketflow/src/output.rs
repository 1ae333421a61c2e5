use bucketflow_deploy::{
    CancellationToken, DeployError, DeployEvent, DeploySession, EventType, Invocation, Level,
    RunOutcome, Runner,
};
use colored::Colorize;
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One event, either as an NDJSON line or colored for a terminal
pub fn print_event(event: &DeployEvent, json: bool) {
    if json {
        match event.to_json_line() {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Could not encode event: {}", e),
        }
        return;
    }

    if event.event_type == Some(EventType::ErrorIntelligence) {
        print_intelligence(event);
        return;
    }

    match event.level {
        Level::Info => println!("  {}", event.message),
        Level::Warn => println!("  {} {}", "⚠".yellow(), event.message.yellow()),
        Level::Error => println!("  {} {}", "✗".red(), event.message.red()),
        Level::Success => println!("  {} {}", "✓".green(), event.message.green()),
        Level::Command => println!("{}", event.message.cyan().bold()),
    }
}

fn print_intelligence(event: &DeployEvent) {
    println!();
    println!("{} {}", "💡".yellow(), event.message.bold());
    if !event.fix_commands.is_empty() {
        println!("  {}", "Try:".bold());
        for fix in &event.fix_commands {
            println!("    {}  {}", fix.command.cyan(), fix.description.dimmed());
        }
    }
    for tip in &event.tips {
        println!("  • {}", tip);
    }
}

/// Run `invocation`, printing events as they arrive. Ctrl-C cancels the run.
pub async fn stream_run(
    runner: &Runner,
    invocation: &Invocation,
    json: bool,
) -> Result<RunOutcome, DeployError> {
    let session = DeploySession::new();
    let mut cursor = session.follow();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let run = runner.run(invocation, &session, cancel);
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            biased;
            batch = cursor.next_batch() => {
                for event in &batch {
                    print_event(event, json);
                }
            }
            result = &mut run => break result,
        }
    };

    for event in cursor.take_pending() {
        print_event(&event, json);
    }
    ctrl_c.abort();

    result
}
