//! Interactive month and stage selection.

use dialoguer::{Input, MultiSelect};
use indicatif::MultiProgress;
use taxi_demand_pipeline::{MonthId, RunConfig, Stage, available_months};

/// Prompts for a month and a set of stages, then runs them.
///
/// # Errors
///
/// Returns an error if a prompt fails or any selected stage fails.
pub fn run(multi: &MultiProgress, config: RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Taxi Demand Forecasting");
    println!();

    let known = available_months(&config)?;
    if !known.is_empty() {
        let list: Vec<String> = known.iter().map(ToString::to_string).collect();
        println!("Months with model predictions: {}", list.join(", "));
    }

    let month: String = Input::new()
        .with_prompt("Month (YYYY-MM)")
        .default(config.month.to_string())
        .validate_with(|input: &String| -> Result<(), String> {
            input
                .parse::<MonthId>()
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()?;
    let config = config.with_month(month.parse()?);

    let labels: Vec<&str> = Stage::ALL.iter().map(|s| s.label()).collect();
    let defaults = vec![true; Stage::ALL.len()];
    let selected = MultiSelect::new()
        .with_prompt("Stages (space=toggle, a=all, enter=confirm)")
        .items(&labels)
        .defaults(&defaults)
        .interact()?;

    if selected.is_empty() {
        println!("No stages selected.");
        return Ok(());
    }

    let stages: Vec<Stage> = selected.iter().map(|&i| Stage::ALL[i]).collect();
    crate::run(multi, &config, &stages)
}
