/* Copyright (C) 2022 Antmicro
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fabgen::arch::{self, OpenOpts};
use fabgen::crossbar::crossbar;
use fabgen::dbg_log;
use fabgen::error::{FabricError, Result};
use fabgen::exporter::*;
#[allow(unused)]
use fabgen::log::*;

#[derive(Parser, Debug)]
#[command(
    author = "Antmicro",
    version = "0.1.0",
    about = "FABGEN - FPGA routing fabric generator",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: SubCommands,
}

#[derive(Parser, Debug)]
struct BuildCmd {
    #[arg(help = "Architecture description (YAML)")]
    arch: String,
    #[arg(long, help = "Use raw (uncompressed) architecture file")]
    raw: bool,
    #[arg(
        long,
        help = "Modules to have their netlists exported to JSON files (`:all` for every module)"
    )]
    netlist: Option<Vec<String>>,
    #[arg(long, default_value = "", help = "Directory for saving netlist .json files")]
    netlist_prefix: String,
    #[arg(long, help = "File for saving per-module statistics of all modules")]
    summary: Option<String>,
}

#[derive(Parser, Debug)]
struct CrossbarCmd {
    #[arg(help = "Number of channel tracks")]
    tracks: usize,
    #[arg(help = "Number of port bits")]
    bits: usize,
    #[arg(help = "Tracks connected to every bit")]
    fc: usize,
    #[arg(long, default_value = "1", help = "Number of successive ports sharing the tracks")]
    ports: usize,
}

#[derive(Parser, Debug)]
enum SubCommands {
    Build(BuildCmd),
    Crossbar(CrossbarCmd),
}

fn build(args: BuildCmd) -> Result<()> {
    let arch = arch::open(Path::new(&args.arch), OpenOpts { raw: args.raw })?;
    let ctx = arch.build()?;

    for (_, module) in ctx.db.iter() {
        println!(concat!(
            "Module {} ({}, {}x{}):\n",
            "    No. of ports:        {}\n",
            "    No. of instances:    {}\n",
            "    No. of connections:  {}"
            ),
            module.name,
            module.class.name(),
            module.width,
            module.height,
            module.ports().len(),
            module.instances().len(),
            module.connection_count()
        );
    }

    let mut netlist_exporter =
        MultiFileExporter::new(&args.netlist, args.netlist_prefix.clone(), ".json".into());
    export_netlists(&ctx.db, &mut netlist_exporter)?;

    if let Some(summary) = &args.summary {
        let mut summary_exporter =
            CompoundJsonExporter::new(&Some(vec![":all".into()]), PathBuf::from(summary));
        export_summaries(&ctx.db, &mut summary_exporter)?;
    }

    Ok(())
}

fn print_crossbar(args: CrossbarCmd) -> Result<()> {
    if args.tracks == 0 {
        return Err(FabricError::config("a crossbar needs at least one track"));
    }
    if args.fc > args.tracks {
        dbg_log!(DBG_WARN, "FC of {} exceeds {} tracks, connecting every track", args.fc, args.tracks);
    }

    /* successive ports share the usage counters */
    let mut n_selected = vec![0; args.tracks];
    for port in 0 .. args.ports {
        println!("Port #{}:", port);
        let pairs = crossbar(args.tracks, args.bits, args.fc, &mut n_selected);
        for bit in 0 .. args.bits {
            let tracks: Vec<String> = pairs.iter()
                .filter(|(_, b)| *b == bit)
                .map(|(t, _)| t.to_string())
                .collect();
            println!("    bit {:>3}: {}", bit, tracks.join(" "));
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let result = match args.command {
        SubCommands::Build(sargs) => build(sargs),
        SubCommands::Crossbar(sargs) => print_crossbar(sargs),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
