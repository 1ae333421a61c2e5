use crate::context::AppContext;
use crate::output::print_json;
use bucketflow_cloud::CloudGateway;
use colored::Colorize;

pub async fn handle(ctx: &AppContext, json: bool) -> anyhow::Result<()> {
    let gateway = ctx.gateway();
    let status = gateway.check_auth().await?;

    if json {
        return print_json(&serde_json::json!({
            "authenticated": status.authenticated,
            "accountInfo": status.account_info,
            "error": status.error,
            "profile": gateway.cli().profile(),
            "region": gateway.cli().region(),
        }));
    }

    if status.authenticated {
        println!(
            "{} {}",
            "✓".green(),
            status.account_info.as_deref().unwrap_or("authenticated")
        );
        if let Some(profile) = gateway.cli().profile() {
            println!("  Profile: {}", profile.cyan());
        }
        if let Some(region) = gateway.cli().region() {
            println!("  Region:  {}", region.cyan());
        }
        Ok(())
    } else {
        anyhow::bail!(
            "Not authenticated: {}\n\nRun {} or {} first.",
            status.error.as_deref().unwrap_or("unknown error"),
            "aws sso login".cyan(),
            "aws configure".cyan()
        )
    }
}
