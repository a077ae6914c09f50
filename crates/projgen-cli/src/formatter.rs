use std::process::ExitCode;

use projgen::{BuildLine, Diagnostics, LineKind, Severity};
use serde_json::json;

use crate::commands::CommandResult;
use crate::commands::graph::ModuleView;
use crate::error::CliError;

pub enum OutputFormat {
    Text,
    Json,
}

/// Prints a `CommandResult` as text or a single JSON line and turns it into the exit code.
pub fn emit_result(result: CommandResult, format: OutputFormat) -> Result<ExitCode, CliError> {
    match format {
        OutputFormat::Text => print_text(&result),
        OutputFormat::Json => print_json(&result)?,
    };
    Ok(ExitCode::from(result.exit_status().code()))
}

fn print_text(result: &CommandResult) {
    match result {
        CommandResult::Generated {
            root,
            order,
            written,
            preserved,
            diagnostics,
        } => {
            println!("Generated {} module(s) under {root}", order.len());
            if !order.is_empty() {
                println!("  order: {}", order.join(" -> "));
            }
            for path in written {
                println!("  wrote {path}");
            }
            for path in preserved {
                println!("  kept  {path}");
            }
            print_diagnostics(diagnostics);
        }
        CommandResult::Graph {
            modules,
            plugins,
            order,
            cycle,
            diagnostics,
        } => {
            println!("Modules ({}):", modules.len());
            for module in modules {
                print_module(module);
            }
            println!("Plugins ({}):", plugins.len());
            for plugin in plugins {
                println!(
                    "  - {} ({:?}) editor: {} player: {}",
                    plugin.name,
                    plugin.kind,
                    platform_list(plugin.in_editor.iter()),
                    platform_list(plugin.player.iter())
                );
            }
            match (order, cycle) {
                (Some(order), _) => println!("Order: {}", order.join(" -> ")),
                (None, Some(cycle)) => println!("Cycle among: {}", cycle.join(", ")),
                (None, None) => {}
            }
            print_diagnostics(diagnostics);
        }
        CommandResult::Build { outcome } => {
            for line in &outcome.lines {
                print_build_line(line);
            }
            let status = if outcome.success() { "succeeded" } else { "FAILED" };
            let code = outcome
                .exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".into());
            println!(
                "Build {} {status} (exit {code}, {} error(s), {} warning(s))",
                outcome.target,
                outcome.count(LineKind::Error),
                outcome.count(LineKind::Warning)
            );
        }
        CommandResult::Retarget { rules, outcomes } => {
            for rule in rules {
                println!("Rule: '{}' -> '{}'", rule.find, rule.replace);
            }
            for outcome in outcomes {
                match (&outcome.changed_lines, &outcome.error) {
                    (_, Some(error)) => println!("  [ERR] {}: {error}", outcome.path.display()),
                    (Some(0), None) => println!("  unchanged {}", outcome.path.display()),
                    (Some(changed), None) => {
                        println!("  {} ({changed} line(s) changed)", outcome.path.display())
                    }
                    (None, None) => {}
                }
            }
        }
    }
}

fn print_module(module: &ModuleView) {
    println!(
        "  - {} [{}] {{{}}} editor: {} player: {}",
        module.name,
        module.class,
        module.id,
        platform_list(module.in_editor.iter()),
        platform_list(module.player.iter())
    );
    for edge in &module.dependencies {
        println!(
            "      -> {} editor: {} player: {}",
            edge.dependency,
            platform_list(edge.in_editor.iter()),
            platform_list(edge.player.iter())
        );
    }
}

fn platform_list<'a>(platforms: impl Iterator<Item = &'a String>) -> String {
    let names: Vec<&str> = platforms.map(String::as_str).collect();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(",")
    }
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    if diagnostics.is_empty() {
        return;
    }
    println!("Diagnostics ({}):", diagnostics.len());
    for diagnostic in diagnostics.iter() {
        let label = match diagnostic.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        println!("  [{label}] {}: {}", diagnostic.owner, diagnostic.message);
    }
}

fn print_build_line(line: &BuildLine) {
    let origin = line
        .origin
        .as_deref()
        .map(|origin| format!("{origin}: "))
        .unwrap_or_default();
    let code = line
        .code
        .as_deref()
        .map(|code| format!(" {code}"))
        .unwrap_or_default();
    match line.kind {
        LineKind::Information => println!("{}", line.text),
        LineKind::Warning => println!("[warning{code}] {origin}{}", line.text),
        LineKind::Error => println!("[error{code}] {origin}{}", line.text),
    }
}

fn print_json(result: &CommandResult) -> Result<(), CliError> {
    let payload = json!(result);
    println!("{payload}");
    Ok(())
}
