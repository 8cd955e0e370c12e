//! Load a CLAP plugin, run a few blocks through it and print what it exposes.
//!
//! ```text
//! plugin-probe <path.clap> [index]
//! plugin-probe --scan
//! ```

use std::env;
use std::path::PathBuf;
use tenuto_clap::{scan, HostConfig, PluginHost, PluginLibrary, Result};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZE: u32 = 256;
const BLOCKS: usize = 16;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let Some(first) = args.next() else {
        eprintln!("usage: plugin-probe <path.clap> [index] | --scan");
        std::process::exit(2);
    };

    if first == "--scan" {
        return list_system_plugins();
    }

    let path = PathBuf::from(first);
    let index = match args.next() {
        Some(arg) => match arg.parse() {
            Ok(index) => index,
            Err(_) => {
                eprintln!("invalid plugin index: {arg}");
                std::process::exit(2);
            }
        },
        None => 0,
    };
    probe(path, index)
}

fn list_system_plugins() -> Result<()> {
    for path in scan::find_system_plugins() {
        let library = match PluginLibrary::open(&path) {
            Ok(library) => library,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        for descriptor in library.descriptors()? {
            println!(
                "{}  [{}] {} ({})",
                path.display(),
                descriptor.index,
                descriptor.name,
                descriptor.id
            );
        }
    }
    Ok(())
}

fn probe(path: PathBuf, index: u32) -> Result<()> {
    let mut host = PluginHost::new(HostConfig::default().name("plugin-probe"))?;
    host.load(&path, index)?;

    if let Some(metadata) = host.metadata() {
        println!("{} {}", metadata.descriptor.name, metadata.descriptor.version);
        println!("  id:      {}", metadata.descriptor.id);
        println!("  vendor:  {}", metadata.descriptor.vendor);
        println!(
            "  audio:   {} in / {} out",
            metadata.audio_io.inputs, metadata.audio_io.outputs
        );
        println!("  editor:  {}", metadata.has_editor);
        println!("  state:   {}", metadata.has_state);
    }

    println!("  params:");
    for param in host.params().iter() {
        let info = param.info();
        let text = host.param_value_to_text(param.id(), param.value())?;
        println!(
            "    {:>6}  {:<24} {:<12} [{}, {}]",
            param.id(),
            info.name,
            text,
            info.min_value,
            info.max_value
        );
    }
    for page in host.quick_controls().pages() {
        println!("  quick controls page {}: {}", page.id, page.name);
    }

    host.activate(SAMPLE_RATE, BLOCK_SIZE)?;
    let (inputs, outputs) = host
        .metadata()
        .map(|m| (m.audio_io.inputs, m.audio_io.outputs))
        .unwrap_or((2, 2));

    if let Some(mut processor) = host.take_processor() {
        processor.set_ports(inputs, outputs, BLOCK_SIZE);
        let audio = std::thread::spawn(move || {
            let mut statuses = Vec::with_capacity(BLOCKS);
            for _ in 0..BLOCKS {
                let status = processor
                    .process_begin(BLOCK_SIZE)
                    .and_then(|_| processor.process())
                    .and_then(|status| processor.process_end(BLOCK_SIZE).map(|_| status));
                statuses.push(status);
            }
            statuses
        });
        match audio.join() {
            Ok(statuses) => {
                for (block, status) in statuses.iter().enumerate() {
                    println!("  block {block:>2}: {status:?}");
                }
            }
            Err(_) => eprintln!("audio thread panicked"),
        }
    }

    host.idle()?;
    host.deactivate()?;
    host.unload();
    Ok(())
}
