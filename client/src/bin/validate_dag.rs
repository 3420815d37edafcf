use clap::Parser;
use common::{Dag, DagDocument, DagError};
use std::{path::PathBuf, process::ExitCode};

/// Valida un DAG sin hablar con el master.
/// Sale con 1 si el archivo o sus referencias son inválidos, 2 si hay ciclo.
#[derive(Parser)]
#[command(name = "validate-dag")]
#[command(about = "Valida un archivo JSON de DAG y muestra su orden topológico")]
struct Args {
    #[arg(value_name = "DAG_JSON")]
    path: PathBuf,
}

#[derive(Debug, PartialEq)]
enum Outcome {
    /// ids de stages en orden topológico
    Valid(Vec<String>),
    Invalid(String),
    Cyclic(Vec<String>),
}

fn validate(bytes: &[u8]) -> Outcome {
    // 1) parseo + ids/referencias
    let dag = match DagDocument::from_slice(bytes).and_then(|doc| Dag::from_stages(doc.stages)) {
        Ok(dag) => dag,
        Err(e) => return Outcome::Invalid(e.to_string()),
    };

    // 2) aciclicidad
    match dag.topological_order() {
        Ok(order) => Outcome::Valid(order.into_iter().map(str::to_string).collect()),
        Err(DagError::Cycle { path }) => Outcome::Cyclic(path),
        Err(e) => Outcome::Invalid(e.to_string()),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let bytes = match std::fs::read(&args.path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("no se pudo leer {}: {}", args.path.display(), e);
            return ExitCode::from(1);
        }
    };

    match validate(&bytes) {
        Outcome::Valid(order) => {
            println!("DAG válido ({} stages). Orden topológico:", order.len());
            for id in order {
                println!("  {id}");
            }
            ExitCode::SUCCESS
        }
        Outcome::Invalid(reason) => {
            eprintln!("DAG inválido: {reason}");
            ExitCode::from(1)
        }
        Outcome::Cyclic(path) => {
            eprintln!("el DAG contiene un ciclo: {}", path.join(" -> "));
            ExitCode::from(2)
        }
    }
}
