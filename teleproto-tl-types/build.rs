//! Parses the bundled `.tl` schemas and generates the Rust modules.

use std::env;
use std::fs;
use std::io;

use teleproto_tl_gen::{Config, Outputs, generate};
use teleproto_tl_parser::{parse_layer, parse_tl_file_with_lines, tl::Definition};

fn feature(name: &str) -> bool {
    env::var_os(format!("CARGO_FEATURE_{}", name.to_uppercase().replace('-', "_"))).is_some()
}

fn main() -> io::Result<()> {
    let out_dir = env::var("OUT_DIR").map_err(io::Error::other)?;

    let schemas = [("tl/api.tl", "tl-api"), ("tl/mtproto.tl", "tl-mtproto")];
    let mut defs: Vec<Definition> = Vec::new();
    let mut layer = 0;

    for (path, gate) in schemas {
        println!("cargo:rerun-if-changed={path}");
        if !feature(gate) {
            continue;
        }

        let content = fs::read_to_string(path)?;
        layer = layer.max(parse_layer(&content).unwrap_or(0));

        for (line, parsed) in parse_tl_file_with_lines(&content) {
            match parsed {
                Ok(def) => defs.push(def),
                Err(e) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("{path}:{line}: {e}"),
                    ));
                }
            }
        }
    }

    let config = Config {
        layer,
        deserializable_functions: feature("deserializable-functions"),
        impl_debug: feature("impl-debug"),
        impl_from_type: feature("impl-from-type"),
        impl_from_enum: feature("impl-from-enum"),
    };

    let mut outputs = Outputs::from_dir(&out_dir)?;
    generate(&defs, &config, &mut outputs)?;
    outputs.flush()
}
