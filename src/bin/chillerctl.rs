use chiller_sim::chiller::ChillerState;
use chiller_sim::codec::{decode_f32, encode_f32};
use chiller_sim::registers::{COIL_PUBLISH, COIL_RESET, COIL_SIMULATE, SETTING_TEMP_REGISTER};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use serde::Serialize;
use std::error::Error;
use std::time::Duration;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "503";
const DEFAULT_UNIT_ID: &str = "1";

#[derive(Debug, Clone, Copy, Serialize)]
struct DeviceSnapshot {
    setting_temp_c: f64,
    entering_temp_c: f64,
    leaving_temp_c: f64,
    publish: bool,
    reset_pending: bool,
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let state_arg = || {
        Arg::with_name("state")
            .help("Coil state")
            .required(true)
            .possible_values(&["on", "off", "enable", "disable"])
    };

    let matches = App::new("chillerctl")
        .version("0.1.0")
        .about("🧊 Operator console for the chiller controller simulator")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator Modbus TCP port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("unit-id")
                .short("u")
                .long("unit-id")
                .value_name("ID")
                .help("Modbus unit identifier")
                .takes_value(true)
                .default_value(DEFAULT_UNIT_ID)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("status")
                .about("📊 Read temperatures and control coils")
        )
        .subcommand(
            SubCommand::with_name("setpoint")
                .about("🎯 Write the leaving water setting")
                .arg(
                    Arg::with_name("celsius")
                        .help("Setting in °C (adopted only when strictly between 0 and 30)")
                        .required(true)
                        .allow_hyphen_values(true)
                        .validator(|v| match v.parse::<f64>() {
                            Ok(value) if value.is_finite() => Ok(()),
                            _ => Err("Setting must be a finite number".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("publish")
                .about("📡 Enable or pause publishing into the register map")
                .arg(state_arg()),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("🌡️  Enable or freeze the temperature simulation")
                .arg(state_arg()),
        )
        .subcommand(
            SubCommand::with_name("reset")
                .about("🔄 Restore the chiller state to defaults on the next tick")
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📈 Poll the device repeatedly")
                .arg(
                    Arg::with_name("interval")
                        .short("i")
                        .long("interval")
                        .value_name("MS")
                        .help("Polling interval in milliseconds")
                        .takes_value(true)
                        .default_value("2000"),
                )
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .value_name("N")
                        .help("Number of polls (default: until interrupted)")
                        .takes_value(true),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let unit_id = matches.value_of("unit-id").unwrap_or(DEFAULT_UNIT_ID).parse::<u8>()?;
    let format = matches.value_of("format").unwrap_or("table");

    let mut ctx = connect(host, port, unit_id).await?;

    match matches.subcommand() {
        ("status", _) => {
            let snapshot = read_snapshot(&mut ctx).await?;
            print_snapshot(&snapshot, format)?;
        }
        ("setpoint", Some(sub_matches)) => {
            handle_setpoint(&mut ctx, sub_matches, format).await?;
        }
        ("publish", Some(sub_matches)) => {
            let state = normalize_state(sub_matches.value_of("state").unwrap_or("on"));
            ctx.write_single_coil(COIL_PUBLISH, state).await??;
            print_command_result("Publishing", if state { "ENABLED" } else { "PAUSED" }, format);
        }
        ("simulate", Some(sub_matches)) => {
            let state = normalize_state(sub_matches.value_of("state").unwrap_or("on"));
            ctx.write_single_coil(COIL_SIMULATE, state).await??;
            print_command_result("Simulation", if state { "ENABLED" } else { "FROZEN" }, format);
        }
        ("reset", _) => {
            ctx.write_single_coil(COIL_RESET, true).await??;
            print_command_result("Reset", "REQUESTED", format);
        }
        ("monitor", Some(sub_matches)) => {
            handle_monitor(&mut ctx, sub_matches, format).await?;
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

async fn connect(host: &str, port: u16, unit_id: u8) -> Result<Context, Box<dyn Error>> {
    let socket_addr = tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| format!("Cannot resolve {}:{}", host, port))?;
    Ok(tcp::connect_slave(socket_addr, Slave(unit_id)).await?)
}

async fn read_snapshot(ctx: &mut Context) -> Result<DeviceSnapshot, Box<dyn Error>> {
    let registers = ctx.read_holding_registers(SETTING_TEMP_REGISTER, 6).await??;
    let &[s_hi, s_lo, e_hi, e_lo, l_hi, l_lo] = registers.as_slice() else {
        return Err(format!("Expected 6 registers, got {}", registers.len()).into());
    };

    let coils = ctx.read_coils(COIL_PUBLISH, 3).await??;
    let &[publish, reset_pending, simulate, ..] = coils.as_slice() else {
        return Err(format!("Expected 3 coils, got {}", coils.len()).into());
    };

    Ok(DeviceSnapshot {
        setting_temp_c: decode_f32(s_hi, s_lo),
        entering_temp_c: decode_f32(e_hi, e_lo),
        leaving_temp_c: decode_f32(l_hi, l_lo),
        publish,
        reset_pending,
        simulate,
    })
}

async fn handle_setpoint(ctx: &mut Context, matches: &ArgMatches<'_>, format: &str) -> Result<(), Box<dyn Error>> {
    let celsius: f64 = matches.value_of("celsius").unwrap_or_default().parse()?;
    let (high, low) = encode_f32(celsius);
    ctx.write_multiple_registers(SETTING_TEMP_REGISTER, &[high, low]).await??;

    print_command_result("Setting", &format!("{:.2}°C", celsius), format);
    if !ChillerState::is_valid_setting(celsius) && format != "json" {
        println!(
            "{} {}",
            "⚠️".yellow(),
            "Outside (0, 30) °C - the device will ignore this value".yellow()
        );
    }
    Ok(())
}

async fn handle_monitor(ctx: &mut Context, matches: &ArgMatches<'_>, format: &str) -> Result<(), Box<dyn Error>> {
    let interval_ms: u64 = matches.value_of("interval").unwrap_or("2000").parse()?;
    let count: Option<u64> = matches.value_of("count").map(str::parse::<u64>).transpose()?;

    if format == "table" {
        println!("{}", "📈 Monitoring chiller (Press Ctrl+C to stop)...".bright_blue().bold());
    }

    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut polls = 0u64;
    while count.map_or(true, |limit| polls < limit) {
        interval.tick().await;
        let snapshot = read_snapshot(ctx).await?;
        print_snapshot(&snapshot, format)?;
        polls += 1;
    }
    Ok(())
}

fn normalize_state(state: &str) -> bool {
    matches!(state, "on" | "enable")
}

fn flag(value: bool) -> ColoredString {
    if value {
        "ON".bright_green()
    } else {
        "OFF".bright_red()
    }
}

fn print_snapshot(snapshot: &DeviceSnapshot, format: &str) -> Result<(), Box<dyn Error>> {
    match format {
        "json" => println!("{}", serde_json::to_string(snapshot)?),
        "compact" => println!(
            "SP={:.2} EWT={:.2} LWT={:.2} PUB={} SIM={}",
            snapshot.setting_temp_c,
            snapshot.entering_temp_c,
            snapshot.leaving_temp_c,
            u8::from(snapshot.publish),
            u8::from(snapshot.simulate)
        ),
        _ => {
            println!("{} {}", "🧊".bright_blue(), "Chiller Status".bright_blue().bold());
            println!("  {} {:>7.2} °C", "Setting:        ".bright_white(), snapshot.setting_temp_c);
            println!("  {} {:>7.2} °C", "Entering water: ".bright_white(), snapshot.entering_temp_c);
            println!("  {} {:>7.2} °C", "Leaving water:  ".bright_white(), snapshot.leaving_temp_c);
            println!("  {} {}", "Publish (300):  ".bright_white(), flag(snapshot.publish));
            println!("  {} {}", "Reset (301):    ".bright_white(), flag(snapshot.reset_pending));
            println!("  {} {}", "Simulate (302): ".bright_white(), flag(snapshot.simulate));
            if !snapshot.publish {
                println!("  {}", "Register values are stale while publishing is paused".yellow());
            }
        }
    }
    Ok(())
}

fn print_command_result(subject: &str, value: &str, format: &str) {
    match format {
        "json" => println!(
            "{}",
            serde_json::json!({ "command": subject, "value": value, "status": "Success" })
        ),
        "compact" => println!("{} {}", subject, value),
        _ => println!("{} {} {}", "✅".green(), format!("{}:", subject).bright_white(), value.bright_green()),
    }
}
