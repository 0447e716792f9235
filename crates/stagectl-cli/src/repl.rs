//! REPL – Read-Eval-Print Loop for the stagectl interactive shell.
//!
//! Supported slash-commands:
//!   /help                           – show this list
//!   /axes                           – list configured axes and their state
//!   /enable <serial>                – run the enable handshake again
//!   /home <serial>                  – start homing
//!   /move <serial> <target>         – absolute move
//!   /rel <serial> <delta>           – relative move
//!   /jog <serial> <speed>           – continuous move, sign selects direction
//!   /stop <serial>                  – decelerate to a stop
//!   /estop                          – immediate stop of every axis
//!   /velocity <serial> [max] [acc]  – update the velocity profile (`-` keeps a value)
//!   /reset <serial>                 – disable, disconnect, create, enable
//!   /quit | /exit                   – release every axis and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use stagectl_hal::AxisRegistry;
use stagectl_types::{MotionIntent, MoveOutcome, StageError};

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Axes,
    Enable(String),
    Motion(MotionIntent),
    Velocity {
        serial: String,
        max_velocity: Option<f64>,
        acceleration: Option<f64>,
    },
    Reset(String),
    Quit,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(registry: Arc<Mutex<AxisRegistry>>, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "stagectl>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }

        let command = match parse_command(cmd) {
            Ok(command) => command,
            Err(msg) => {
                println!("{} {}", "Error:".red(), msg);
                continue;
            }
        };

        if command == Command::Quit {
            println!("{}", "Goodbye.".green());
            shutdown.store(true, Ordering::SeqCst);
            break;
        }

        let mut axes = registry.lock().unwrap_or_else(PoisonError::into_inner);
        match execute(&mut axes, command) {
            Ok(report) => println!("{report}"),
            Err(e) => println!("{} {}", "Error:".red(), e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse one input line into a [`Command`].
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let name = words.next().ok_or_else(|| "empty command".to_string())?;
    let args: Vec<&str> = words.collect();

    let command = match name {
        "/help" => Command::Help,
        "/axes" => Command::Axes,
        "/estop" => Command::Motion(MotionIntent::EmergencyStop),
        "/quit" | "/exit" => Command::Quit,
        "/enable" => Command::Enable(serial_arg(name, &args, 1)?),
        "/reset" => Command::Reset(serial_arg(name, &args, 1)?),
        "/home" => Command::Motion(MotionIntent::Home {
            serial: serial_arg(name, &args, 1)?,
        }),
        "/stop" => Command::Motion(MotionIntent::Stop {
            serial: serial_arg(name, &args, 1)?,
        }),
        "/move" => Command::Motion(MotionIntent::MoveAbsolute {
            serial: serial_arg(name, &args, 2)?,
            target: number_arg(name, args[1])?,
        }),
        "/rel" => Command::Motion(MotionIntent::MoveRelative {
            serial: serial_arg(name, &args, 2)?,
            delta: number_arg(name, args[1])?,
        }),
        "/jog" => Command::Motion(MotionIntent::Jog {
            serial: serial_arg(name, &args, 2)?,
            speed: number_arg(name, args[1])?,
        }),
        "/velocity" => {
            if args.is_empty() || args.len() > 3 {
                return Err(format!("usage: {name} <serial> [max_velocity] [acceleration]"));
            }
            Command::Velocity {
                serial: args[0].to_string(),
                max_velocity: optional_number_arg(name, args.get(1).copied())?,
                acceleration: optional_number_arg(name, args.get(2).copied())?,
            }
        }
        other => {
            return Err(format!(
                "unknown command '{}'. Type /help for available commands.",
                other
            ));
        }
    };
    Ok(command)
}

/// Check the argument count and return the serial number (always first).
fn serial_arg(name: &str, args: &[&str], expected: usize) -> Result<String, String> {
    if args.len() != expected {
        let usage = if expected == 1 {
            format!("usage: {name} <serial>")
        } else {
            format!("usage: {name} <serial> <value>")
        };
        return Err(usage);
    }
    Ok(args[0].to_string())
}

fn number_arg(name: &str, raw: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("{name}: '{raw}' is not a number")),
    }
}

fn optional_number_arg(name: &str, raw: Option<&str>) -> Result<Option<f64>, String> {
    match raw {
        None | Some("-") => Ok(None),
        Some(raw) => number_arg(name, raw).map(Some),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

/// Run `command` against `registry` and return the text to print.
pub fn execute(registry: &mut AxisRegistry, command: Command) -> Result<String, StageError> {
    match command {
        Command::Help => Ok(help_text()),
        Command::Axes => Ok(axes_report(registry)),
        Command::Enable(serial) => {
            registry.axis_mut(&serial)?.enable()?;
            Ok(format!("{} {} enabled", "✓".green(), serial.bold()))
        }
        Command::Motion(intent) => {
            let label = intent_label(&intent);
            let outcome = registry.dispatch(intent)?;
            Ok(outcome_report(&label, &outcome))
        }
        Command::Velocity {
            serial,
            max_velocity,
            acceleration,
        } => {
            let params = registry
                .axis_mut(&serial)?
                .set_velocity(max_velocity, acceleration)?;
            Ok(format!(
                "{} {} max velocity {:.3}, acceleration {:.3}",
                "✓".green(),
                serial.bold(),
                params.max_velocity,
                params.acceleration
            ))
        }
        Command::Reset(serial) => {
            registry.axis_mut(&serial)?.reset()?;
            Ok(format!("{} {} reset", "✓".green(), serial.bold()))
        }
        Command::Quit => Ok(String::new()),
    }
}

fn help_text() -> String {
    let rows = [
        ("/axes", "list configured axes"),
        ("/enable <serial>", "run the enable handshake"),
        ("/home <serial>", "start homing"),
        ("/move <serial> <target>", "absolute move"),
        ("/rel <serial> <delta>", "relative move"),
        ("/jog <serial> <speed>", "continuous move (sign = direction)"),
        ("/stop <serial>", "decelerate to a stop"),
        ("/estop", "immediate stop of every axis"),
        ("/velocity <serial> [max] [acc]", "update velocity profile ('-' keeps)"),
        ("/reset <serial>", "recover a misbehaving axis"),
        ("/quit  /exit", "release every axis and exit"),
    ];
    let mut out = format!("{}\n", "stagectl Commands".bold().underline());
    for (cmd, desc) in rows {
        out.push_str(&format!("  {:<32} – {}\n", cmd.bold().cyan(), desc));
    }
    out
}

fn axes_report(registry: &AxisRegistry) -> String {
    if registry.is_empty() {
        return format!("{}", "No axes configured.".yellow());
    }
    let mut out = format!("{}\n", "Axes".bold().underline());
    for serial in registry.serials() {
        let Some(axis) = registry.get(&serial) else {
            continue;
        };
        let position = match axis.position() {
            Ok(p) => format!("{p:.3}"),
            Err(_) => "?".to_string(),
        };
        let homed = match axis.is_homed() {
            Ok(true) => "homed".green(),
            Ok(false) => "not homed".yellow(),
            Err(_) => "unknown".red(),
        };
        let moving = match axis.is_moving() {
            Ok(true) => "moving",
            _ => "",
        };
        out.push_str(&format!(
            "  {}  {:<16} pos {:>9}  {} {}\n",
            serial.bold(),
            axis.family().to_string(),
            position,
            homed,
            moving
        ));
    }
    out
}

fn intent_label(intent: &MotionIntent) -> String {
    match intent {
        MotionIntent::Home { serial } => format!("home {serial}"),
        MotionIntent::MoveAbsolute { serial, target } => format!("move {serial} → {target}"),
        MotionIntent::MoveRelative { serial, delta } => format!("rel {serial} by {delta}"),
        MotionIntent::Jog { serial, speed } => format!("jog {serial} at {speed}"),
        MotionIntent::Stop { serial } => format!("stop {serial}"),
        MotionIntent::EmergencyStop => "emergency stop".to_string(),
    }
}

fn outcome_report(label: &str, outcome: &MoveOutcome) -> String {
    match outcome {
        MoveOutcome::Dispatched => format!("{} {}", "✓".green(), label),
        MoveOutcome::Rejected(r) => format!("{} {}: {}", "✗ rejected".yellow(), label, r),
        MoveOutcome::Halted(r) => format!("{} {}: {}", "■ halted".yellow(), label, r),
        MoveOutcome::Failed(e) => format!("{} {}: {}", "✗ failed".red(), label, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagectl_hal::SimRegistry;
    use stagectl_types::{DeviceFamily, MotorType};

    fn sim() -> AxisRegistry {
        SimRegistry::builder()
            .with_kinesis_axis(DeviceFamily::TCubeStepper, "80864431", MotorType::Translation)
            .with_legacy_axis("83000001")
            .build()
            .unwrap()
            .registry
    }

    #[test]
    fn parses_motion_commands() {
        assert_eq!(
            parse_command("/move 80864431 12.5").unwrap(),
            Command::Motion(MotionIntent::MoveAbsolute {
                serial: "80864431".to_string(),
                target: 12.5,
            })
        );
        assert_eq!(
            parse_command("  /jog 80864431 -0.8 ").unwrap(),
            Command::Motion(MotionIntent::Jog {
                serial: "80864431".to_string(),
                speed: -0.8,
            })
        );
        assert_eq!(
            parse_command("/estop").unwrap(),
            Command::Motion(MotionIntent::EmergencyStop)
        );
        assert_eq!(parse_command("/exit").unwrap(), Command::Quit);
    }

    #[test]
    fn parses_velocity_with_kept_values() {
        assert_eq!(
            parse_command("/velocity 80864431 - 1.5").unwrap(),
            Command::Velocity {
                serial: "80864431".to_string(),
                max_velocity: None,
                acceleration: Some(1.5),
            }
        );
        assert_eq!(
            parse_command("/velocity 80864431").unwrap(),
            Command::Velocity {
                serial: "80864431".to_string(),
                max_velocity: None,
                acceleration: None,
            }
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_command("/move 80864431").is_err());
        assert!(parse_command("/rel 80864431 abc").is_err());
        assert!(parse_command("/move 80864431 NaN").is_err());
        assert!(parse_command("/home").is_err());
        assert!(parse_command("/launch").is_err());
    }

    #[test]
    fn execute_reports_rejected_move() {
        let mut registry = sim();
        let report = execute(
            &mut registry,
            parse_command("/move 80864431 24.6").unwrap(),
        )
        .unwrap();
        assert!(report.contains("rejected"));
        let pos = registry.get("80864431").unwrap().position().unwrap();
        assert!(pos.abs() < f64::EPSILON);
    }

    #[test]
    fn execute_velocity_updates_profile() {
        let mut registry = sim();
        let report = execute(
            &mut registry,
            parse_command("/velocity 80864431 1.0 -").unwrap(),
        )
        .unwrap();
        assert!(report.contains("1.000"));
    }

    #[test]
    fn execute_unsupported_operation_on_legacy_axis() {
        let mut registry = sim();
        let result = execute(&mut registry, parse_command("/jog 83000001 1.0").unwrap());
        assert!(matches!(result, Err(StageError::Unsupported { .. })));
    }

    #[test]
    fn axes_report_lists_every_axis() {
        let registry = sim();
        let report = axes_report(&registry);
        assert!(report.contains("80864431"));
        assert!(report.contains("83000001"));
    }

    #[test]
    fn execute_unknown_serial_is_error() {
        let mut registry = sim();
        assert!(execute(&mut registry, Command::Reset("00000000".to_string())).is_err());
    }
}
