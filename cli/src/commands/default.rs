use anyhow::Result;
use getllm_core::{parse_model_ref, Config};

pub async fn execute(model: Option<&str>) -> Result<()> {
    match model {
        None => {
            let config = Config::load()?;
            match config.models.default_model {
                Some(model) => println!("{}", model),
                None => println!("No default model set. Use `getllm default <model>` to set one."),
            }
        }
        Some(model) => {
            let (_, id) = parse_model_ref(model)?;
            let mut config = Config::load_file()?;
            config.models.default_model = Some(id.clone());
            config.save()?;
            println!("Default model set to {}", id);
        }
    }

    Ok(())
}
