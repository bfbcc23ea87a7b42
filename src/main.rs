//! # Patra CLI
//!
//! Usage:
//!   patra record.json --template identity-card --backend pdf -o card.pdf
//!   echo '{ ... }' | patra --template appointment-letter -o letter.pdf
//!   patra --example > record.json
//!
//! Template background art is read from `--assets` (default `./assets`),
//! remote photo paths from `--photos` (default: same directory).

use std::env;
use std::fs;
use std::io::{self, Read};

use patra::assets::DirSource;
use patra::{BackendKind, Compositor};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--example") {
        print!("{}", example_record_json());
        return;
    }

    let input = if args.len() > 1 && !args[1].starts_with('-') {
        fs::read_to_string(&args[1]).expect("Failed to read input file")
    } else {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .expect("Failed to read stdin");
        buf
    };

    let flag = |name: &str| {
        args.windows(2)
            .find(|w| w[0] == name)
            .map(|w| w[1].clone())
    };

    let template = flag("--template").unwrap_or_else(|| "identity-card".to_string());
    let assets_dir = flag("--assets").unwrap_or_else(|| "assets".to_string());
    let photos_dir = flag("--photos").unwrap_or_else(|| assets_dir.clone());
    let backend = match flag("--backend").as_deref() {
        Some("png") | Some("raster") => BackendKind::Raster,
        _ => BackendKind::Document,
    };

    let compositor = Compositor::new(
        Box::new(DirSource::new(&assets_dir)),
        Box::new(DirSource::new(&photos_dir)),
    );

    match compositor.compose_json(&input, &template, None, backend) {
        Ok(artifact) => {
            let output_path = flag("-o").unwrap_or(artifact.suggested_file_name.clone());
            fs::write(&output_path, &artifact.bytes).expect("Failed to write artifact");
            eprintln!(
                "✓ Written {} bytes ({}) to {}",
                artifact.bytes.len(),
                artifact.mime_type,
                output_path
            );
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    }
}

fn example_record_json() -> &'static str {
    r#"{
  "userId": "160525122516474",
  "name": "Asha Devi",
  "fatherName": "Ram Prasad",
  "age": 53,
  "role": "member",
  "gender": "female",
  "contact": "8123573669",
  "email": "asha.devi@example.org",
  "address": {
    "street": "12 Temple Road",
    "city": "Mathura",
    "state": "Uttar Pradesh",
    "zipCode": "281001",
    "country": "India"
  },
  "aadharCard": "526858887881",
  "pancard": "ABCDE1234F",
  "photoUrl": "photos/asha.jpg"
}
"#
}
