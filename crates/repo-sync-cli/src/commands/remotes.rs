use crate::config::{AppConfig, config_path};

pub fn run(config: &AppConfig) {
    if config.remotes.is_empty() {
        match config_path() {
            Some(path) => println!("No remotes configured in {}", path.display()),
            None => println!("No remotes configured"),
        }
        return;
    }

    let name_width = config
        .remotes
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0);

    for remote in &config.remotes {
        println!(
            "{:<width$}  {:<9}  {}",
            remote.name,
            remote.policy.as_str(),
            remote.url,
            width = name_width
        );
    }
}
