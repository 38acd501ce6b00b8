//! `config` subcommand: show current configuration and file path.

use std::path::Path;

use super::{Config, ConfigOutput, LigoError, Result, StringIndex, kv, kv_indent, kv_width};

fn display_string(value: &str) -> String {
    if value.is_empty() {
        "(empty)".to_string()
    } else {
        format!("{value:?}")
    }
}

fn timeout_label(ms: u64) -> String {
    if ms == 0 {
        "0 (block)".to_string()
    } else {
        format!("{ms} ms")
    }
}

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>, save: bool) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);

    if save {
        let Some(path) = &config_path else {
            return Err(LigoError::Config("no config directory".into()));
        };
        config.save_to(path)?;
        log::info!("saved {}", path.display());
    }

    let config_exists = config_path.as_ref().map(|p| p.exists()).unwrap_or(false);
    let problems: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    };

    if json {
        return super::print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            problems,
        });
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:"],
        &[
            "interface:",
            "read_timeout_ms:",
            "write_timeout_ms:",
            "set_configuration:",
            "reenumerate_timeout_ms:",
            "manufacturer:",
            "description:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    kv_indent("interface:", config.interface, w);
    kv_indent("read_timeout_ms:", timeout_label(config.read_timeout_ms), w);
    kv_indent("write_timeout_ms:", timeout_label(config.write_timeout_ms), w);
    kv_indent("set_configuration:", config.set_configuration, w);
    kv_indent(
        "reenumerate_timeout_ms:",
        format_args!("{} ms", config.reenumerate_timeout_ms),
        w,
    );
    println!();

    println!("Identity:");
    for index in StringIndex::ALL {
        kv_indent(
            &format!("{index}:"),
            display_string(config.identity.get(index)),
            w,
        );
    }

    if !problems.is_empty() {
        println!();
        for p in &problems {
            log::warn!("[config] {p}");
        }
    }
    Ok(())
}
