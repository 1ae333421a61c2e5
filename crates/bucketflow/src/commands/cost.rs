use crate::context::AppContext;
use crate::output::print_json;
use bucketflow_cloud::{CostModel, Usage};
use colored::Colorize;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Gigabytes to whole bytes; negative or non-finite input is zero
pub fn gb_to_bytes(gb: f64) -> u64 {
    if gb.is_finite() && gb > 0.0 {
        (gb * BYTES_PER_GB).round() as u64
    } else {
        0
    }
}

pub fn handle(ctx: &AppContext, usage: &Usage, json: bool) -> anyhow::Result<()> {
    let model = CostModel::new(ctx.settings.pricing.clone());
    let breakdown = model.breakdown(usage);

    if json {
        return print_json(&serde_json::json!({
            "usage": usage,
            "estimate": model.estimate_cost(usage.storage_bytes, usage.write_count, usage.read_count),
            "breakdown": breakdown,
        }));
    }

    println!("{}", "Estimated monthly cost (USD)".bold());
    let rows = [
        ("S3 storage", breakdown.s3_storage),
        ("PUT requests", breakdown.put_requests),
        ("GET requests", breakdown.get_requests),
        ("DELETE requests", breakdown.delete_requests),
        ("LIST requests", breakdown.list_requests),
        ("Origin transfer", breakdown.origin_transfer),
        ("CDN transfer", breakdown.cdn_transfer),
    ];
    for (label, value) in rows {
        println!("  {:<18} {:>12.4}", label, value);
    }
    println!("  {:<18} {:>12}", "", "------------");
    println!(
        "  {:<18} {:>12}",
        "Total".bold(),
        format!("{:.4}", breakdown.total).green().bold()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gb_to_bytes() {
        assert_eq!(gb_to_bytes(1.0), 1_073_741_824);
        assert_eq!(gb_to_bytes(0.5), 536_870_912);
        assert_eq!(gb_to_bytes(-3.0), 0);
        assert_eq!(gb_to_bytes(f64::NAN), 0);
    }
}
