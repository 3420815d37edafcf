use anyhow::{Context, Result};
use common::{Params, Record};
use serde_json::{json, Value};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Ejecuta la operación `op` sobre la partición indicada.
/// `None` significa éxito sin salida.
pub fn execute(op: &str, params: &Params, partition: u32) -> Result<Option<Vec<Record>>> {
    match op {
        "read_csv" => read_csv(params, partition),
        "wordcount" => wordcount(params, partition),
        other => {
            info!("op '{}' sin implementación, la tarea termina sin salida", other);
            Ok(None)
        }
    }
}

/* ---------------- parámetros ---------------- */

/// `params.partitions` como número o string; 1 si falta o es inválido.
fn partitions_param(params: &Params) -> u32 {
    let parsed = match params.get("partitions") {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    parsed
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// Archivos que matchean el glob, ordenados por path.
fn matching_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in glob::glob(pattern).with_context(|| format!("patrón inválido: {pattern}"))? {
        files.push(entry.context("no se pudo leer una entrada del glob")?);
    }
    files.sort();
    Ok(files)
}

/* ---------------- read_csv ---------------- */

/// Filas de todos los archivos del glob; la fila `i` va a la partición
/// `i % partitions`. Cada registro es `{"line": "<fila unida por comas>"}`.
pub fn read_csv(params: &Params, partition: u32) -> Result<Option<Vec<Record>>> {
    let Some(pattern) = params.get("path").and_then(Value::as_str) else {
        debug!("read_csv sin params.path, nada que leer");
        return Ok(None);
    };
    let parts = partitions_param(params) as usize;

    let mut rows = Vec::new();
    for file in matching_files(pattern)? {
        rows.extend(csv_rows(&file)?);
    }

    let out = rows
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % parts == partition as usize)
        .map(|(_, line)| json!({ "line": line }))
        .collect();

    Ok(Some(out))
}

/// Filas de un archivo. Si no parsea como CSV se usan las líneas crudas.
fn csv_rows(path: &Path) -> Result<Vec<String>> {
    let data = fs::read(path).with_context(|| format!("no se pudo leer {}", path.display()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(data.as_slice());

    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(r) => rows.push(r.iter().collect::<Vec<_>>().join(",")),
            Err(e) => {
                warn!(
                    "{} no es CSV válido ({}), usando líneas crudas",
                    path.display(),
                    e
                );
                return Ok(raw_lines(&data));
            }
        }
    }

    Ok(rows)
}

fn raw_lines(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/* ---------------- wordcount ---------------- */

/// Cuenta palabras de los archivos asignados a esta partición
/// (archivo `i` -> partición `i % partitions`).
pub fn wordcount(params: &Params, partition: u32) -> Result<Option<Vec<Record>>> {
    let Some(pattern) = params.get("path").and_then(Value::as_str) else {
        debug!("wordcount sin params.path, nada que contar");
        return Ok(None);
    };
    let parts = partitions_param(params) as usize;

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();

    for (i, file) in matching_files(pattern)?.into_iter().enumerate() {
        if i % parts != partition as usize {
            continue;
        }

        let reader = BufReader::new(
            File::open(&file).with_context(|| format!("no se pudo abrir {}", file.display()))?,
        );
        for line in reader.lines() {
            let line = line.with_context(|| format!("error leyendo {}", file.display()))?;
            for raw in line.split_whitespace() {
                let word = clean_word(raw);
                if !word.is_empty() {
                    *counts.entry(word).or_insert(0) += 1;
                }
            }
        }
    }

    let out = counts
        .into_iter()
        .map(|(word, count)| json!({ "word": word, "count": count }))
        .collect();

    Ok(Some(out))
}

// solo alfanumérico y '_', en minúscula
fn clean_word(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase()
}
