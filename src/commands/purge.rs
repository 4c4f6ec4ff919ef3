use crate::api::Pipeline;
use crate::config::SkewConfig;
use anyhow::Result;

pub fn run(config: SkewConfig, identifier: String) -> Result<()> {
    let pipeline = Pipeline::from_config(config)?;
    if pipeline.purge(&identifier)? {
        println!("Removed cached plot for {}", identifier);
    } else {
        println!("No cached plot for {}", identifier);
    }
    Ok(())
}
