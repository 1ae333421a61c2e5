use crate::output::print_json;
use anyhow::Context;
use bucketflow_deploy::Analyzer;
use colored::Colorize;
use std::io::Read;

pub fn handle(text: Option<String>, command: Option<String>, json: bool) -> anyhow::Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read error text from stdin")?;
            buf
        }
    };

    let diagnosis = Analyzer::default().analyze(&text, command.as_deref());

    if json {
        return print_json(&diagnosis);
    }

    println!("{} {}", "💡".yellow(), diagnosis.diagnosis.bold());
    if !diagnosis.fix_commands.is_empty() {
        println!();
        println!("{}", "Try:".bold());
        for fix in &diagnosis.fix_commands {
            println!("  {}", fix.command.cyan());
            println!("    {}", fix.description.dimmed());
        }
    }
    if !diagnosis.tips.is_empty() {
        println!();
        for tip in &diagnosis.tips {
            println!("• {}", tip);
        }
    }
    Ok(())
}
