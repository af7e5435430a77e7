use clap::Parser;
use pcd_lib::{parse_pcd_file_async, parse_pcd_with, DecodeOptions, HeaderPolicy, PcdMesh};
use serde_json::json;
use std::error::Error;
use std::fs;
use std::process;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "PCD Inspector",
    version = "1.0",
    author = "Denis Avvakumov",
    about = "Decodes PCD point cloud files (ascii, binary, binary_compressed)"
)]
struct Cli {
    #[arg(
        short = 'i',
        long = "input",
        value_name = "INPUT",
        required = true,
        help = "Path to the input file."
    )]
    input: String,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "OUTPUT",
        help = "Write the decoded header, schema and attributes as JSON to this path."
    )]
    output: Option<String>,

    #[arg(
        short = 's',
        long = "strict",
        default_value = "false",
        help = "Reject headers whose FIELDS/SIZE/TYPE/COUNT lengths disagree."
    )]
    strict: bool,

    #[arg(
        short = 'a',
        long = "async",
        default_value = "false",
        help = "Load and decode on the tokio runtime."
    )]
    async_mode: bool,
}

fn summary(mesh: &PcdMesh) -> serde_json::Value {
    let attributes = &mesh.attributes;
    json!({
        "encoding": mesh.loader_data.data.as_str(),
        "version": mesh.loader_data.version,
        "fields": mesh.loader_data.fields,
        "vertexCount": mesh.header.vertex_count,
        "boundingBox": mesh.header.bounding_box,
        "attributes": {
            "POSITION": attributes.position.value.len() / attributes.position.size,
            "NORMAL": attributes.normal.as_ref().map(|a| a.value.len() / a.size),
            "COLOR_0": attributes.color.as_ref().map(|a| a.value.len() / a.size),
        },
        "metadata": mesh.schema.metadata,
    })
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let options = DecodeOptions {
        header_policy: if cli.strict {
            HeaderPolicy::Strict
        } else {
            HeaderPolicy::Lenient
        },
        ..DecodeOptions::default()
    };

    let mode = if cli.async_mode {
        "Asynchronous"
    } else {
        "Synchronous"
    };
    tracing::info!("Mode: {} decode | Input: {}", mode, cli.input);

    let start = Instant::now();

    let mesh = if cli.async_mode {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        rt.block_on(parse_pcd_file_async(&cli.input, options))
    } else {
        let raw_data = fs::read(&cli.input).unwrap_or_else(|e| {
            eprintln!("Error reading input file {}: {}", cli.input, e);
            process::exit(1);
        });
        parse_pcd_with(&raw_data, &options)
    };
    let mesh = mesh.unwrap_or_else(|e| {
        eprintln!("Error decoding {}: {}", cli.input, e);
        process::exit(1);
    });

    let elapsed = start.elapsed().as_millis();
    tracing::info!("Decode Time: {} ms", elapsed);

    println!("{}", serde_json::to_string_pretty(&summary(&mesh))?);

    if let Some(output) = &cli.output {
        let report = serde_json::to_vec_pretty(&mesh)?;
        fs::write(output, report).unwrap_or_else(|e| {
            eprintln!("Error writing output '{}': {}", output, e);
            process::exit(1);
        });
        println!("Successfully wrote to '{}'.", output);
    }

    Ok(())
}
