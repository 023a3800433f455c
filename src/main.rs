use std::fmt::Display;
use std::path::PathBuf;
use std::process::exit;

use log::*;
use mimalloc::MiMalloc;
use structopt::StructOpt;

use crate::config::{
    optional_dir, split_flags, BuildOptions, ExtraFlags, DEFAULT_DEVKITPRO, DEFAULT_MOD_DIR,
    DEFAULT_OUTPUT_DIR, DEFAULT_TASK_EXE, DEFAULT_YUZU_DIR,
};
use crate::tool::{SystemRunner, ToolRunner};

mod archive;
mod codegen;
mod compile;
mod config;
mod crates;
mod deploy;
mod error;
mod layout;
mod paths;
mod pipeline;
mod tool;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Build libmegaton.a to build/a/libmegaton.a. The options below run in
/// addition to building the library (ex: build library, then copy it).
#[derive(StructOpt, Debug)]
#[structopt(name = "megaton-build")]
struct Opt {
    #[structopt(short = "o", long,
        help = "copy libmegaton.a to megaton-old at DIR [default: ../megaton-old]")]
    output: Option<Option<PathBuf>>,
    #[structopt(short = "m", long = "mod",
        help = "compile the example mod at DIR [default: ../megaton-example]")]
    mod_dir: Option<Option<PathBuf>>,
    #[structopt(short = "y", long,
        help = "copy the example mod to the yuzu (or eden) folder at DIR \
                [default: ~/.local/share/eden]")]
    yuzu: Option<Option<PathBuf>>,
    #[structopt(long = "c-flags", number_of_values = 1, allow_hyphen_values = true,
        help = "add flags to the c compiler")]
    c_flags: Vec<String>,
    #[structopt(long = "cxx-flags", number_of_values = 1, allow_hyphen_values = true,
        help = "add flags to the c++ compiler")]
    cxx_flags: Vec<String>,
    #[structopt(long = "as-flags", number_of_values = 1, allow_hyphen_values = true,
        help = "add flags to the assembler")]
    as_flags: Vec<String>,
    #[structopt(long = "com-flags", number_of_values = 1, allow_hyphen_values = true,
        help = "add flags to c, c++ and assembly")]
    com_flags: Vec<String>,
    #[structopt(long = "rs-flags", number_of_values = 1, allow_hyphen_values = true,
        help = "add flags to cargo build")]
    rs_flags: Vec<String>,
    #[structopt(short = "t", long = "task", default_value = DEFAULT_TASK_EXE,
        help = "task executable used to build the example mod")]
    task: String,
    #[structopt(short = "x", long, help = "remove builds and run cargo clean")]
    clean: bool,
    #[structopt(long, parse(from_os_str), env = "DEVKITPRO", default_value = DEFAULT_DEVKITPRO,
        help = "path to the devkitPro installation")]
    devkitpro: PathBuf,
}

impl Opt {
    fn into_options(self, root: PathBuf) -> BuildOptions {
        let mod_requested = self.mod_dir.is_some();
        let mod_dir = optional_dir(self.mod_dir, DEFAULT_MOD_DIR)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MOD_DIR));
        BuildOptions {
            root,
            devkitpro: self.devkitpro,
            output: optional_dir(self.output, DEFAULT_OUTPUT_DIR),
            mod_dir,
            build_mod: mod_requested,
            yuzu: optional_dir(self.yuzu, DEFAULT_YUZU_DIR),
            extra_flags: ExtraFlags {
                common: split_flags(&self.com_flags),
                asm: split_flags(&self.as_flags),
                c: split_flags(&self.c_flags),
                cxx: split_flags(&self.cxx_flags),
                cargo: split_flags(&self.rs_flags),
            },
            task_exe: self.task,
            clean: self.clean,
        }
    }
}

fn failed_fast<T: Display>(msg: T) -> ! {
    error!("{}", msg);
    exit(1)
}

/// `--clean` takes precedence over every other option and never builds.
fn dispatch(options: &BuildOptions, runner: &dyn ToolRunner) -> error::Result<()> {
    if options.clean {
        return pipeline::clean(options, runner);
    }
    pipeline::build(options, runner)
}

fn main() {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();
    let opt: Opt = Opt::from_args();
    let root = std::env::current_dir().unwrap_or_else(|e| failed_fast(e));
    let options = opt.into_options(root);
    debug!("resolved options: {:?}", options);

    match dispatch(&options, &SystemRunner) {
        Ok(()) => {}
        Err(err) if options.clean => failed_fast(err),
        // the failure itself has already been reported by the pipeline
        Err(_) => exit(1),
    }
}
