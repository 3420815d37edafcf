use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{Dag, Job, JobSubmitResponse, JobTask, SchedulerStats, WorkerSummary};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use std::{env, path::PathBuf};

/// Igual que en el worker:
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string())
        .trim_end_matches('/')
        .to_string()
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el master")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Envía un job a partir de un archivo JSON con el DAG
    Submit {
        #[arg(value_name = "DAG_JSON")]
        file: PathBuf,
    },
    /// Consulta el estado de un job
    Status {
        #[arg(value_name = "JOB_ID")]
        id: String,
    },
    /// Lista todos los jobs
    Jobs,
    /// Muestra una tarea con su resultado
    Task {
        #[arg(value_name = "JOB_ID")]
        job_id: String,
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },
    /// Lista los workers registrados
    Workers,
    /// Cola y tareas en vuelo del scheduler
    Scheduler,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Parsea el cuerpo si la respuesta es 2xx; si no, devuelve el error del master.
async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.context("respuesta del master ilegible");
    }

    let body = resp.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    bail!("el master respondió {}: {}", status, reason)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Submit { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("no se pudo leer {}", file.display()))?;

            // validación local antes de molestar al master
            let dag = Dag::load(&bytes).context("DAG inválido")?;

            let url = format!("{}/api/v1/jobs", base_url);
            let resp = client
                .post(&url)
                .header("content-type", "application/json")
                .body(bytes)
                .send()
                .await?;
            let JobSubmitResponse { job_id } = read_json(resp).await?;

            println!("Job creado:");
            println!("  id    : {}", job_id);
            println!("  stages: {}", dag.len());
        }

        Commands::Status { id } => {
            let url = format!("{}/api/v1/jobs/{id}", base_url);
            let job: Job = read_json(client.get(&url).send().await?).await?;
            print_job(&job);
        }

        Commands::Jobs => {
            let url = format!("{}/api/v1/jobs", base_url);
            let jobs: Vec<Job> = read_json(client.get(&url).send().await?).await?;
            if jobs.is_empty() {
                println!("No hay jobs.");
            }
            for job in jobs {
                println!(
                    "{}  {:?}  {:.0}%  ({} tareas, creado {})",
                    job.id,
                    job.state,
                    job.progress * 100.0,
                    job.tasks.len(),
                    job.created_at
                );
            }
        }

        Commands::Task { job_id, task_id } => {
            let url = format!("{}/api/v1/jobs/{job_id}/tasks/{task_id}", base_url);
            let task: JobTask = read_json(client.get(&url).send().await?).await?;
            print_task(&task);

            match &task.result {
                Some(records) => {
                    println!("  resultado ({} registros):", records.len());
                    for r in records {
                        println!("    {}", r);
                    }
                }
                None => println!("  resultado     : (sin datos)"),
            }
        }

        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let workers: Vec<WorkerSummary> = read_json(client.get(&url).send().await?).await?;
            if workers.is_empty() {
                println!("No hay workers registrados.");
            }
            for w in workers {
                println!("Worker {}", w.id);
                println!("  host           : {}", w.host);
                println!("  estado         : {:?}", w.state);
                println!("  last_heartbeat : {} s ago", w.last_heartbeat_secs_ago);
                println!("  tareas activas : {}", w.active_tasks);
                println!();
            }
        }

        Commands::Scheduler => {
            let url = format!("{}/api/v1/scheduler", base_url);
            let stats: SchedulerStats = read_json(client.get(&url).send().await?).await?;
            println!("Tareas en cola: {}", stats.queued_tasks);
            if stats.active_tasks.is_empty() {
                println!("Sin tareas en vuelo.");
            }
            for (worker, n) in stats.active_tasks {
                println!("  {worker}: {n} en vuelo");
            }
        }
    }

    Ok(())
}

fn print_job(job: &Job) {
    println!("Job:");
    println!("  id       : {}", job.id);
    println!("  estado   : {:?}", job.state);
    println!("  progreso : {:.0}%", job.progress * 100.0);
    println!("  creado   : {}", job.created_at);
    if let Some(t) = job.finished_at {
        println!("  terminado: {}", t);
    }
    println!("  tareas   : {} ({} DONE)", job.tasks.len(), job.done_tasks());
    for task in job.tasks.values() {
        println!(
            "    {}  {:?}  intentos={}  worker={}",
            task.id,
            task.status,
            task.attempts,
            task.assigned_to.as_deref().unwrap_or("-")
        );
    }
}

fn print_task(task: &JobTask) {
    println!("Tarea {}", task.id);
    println!("  stage         : {}", task.stage_id);
    println!("  partición     : {}", task.partition);
    println!("  estado        : {:?}", task.status);
    println!("  intentos      : {}", task.attempts);
    println!(
        "  worker        : {}",
        task.assigned_to.as_deref().unwrap_or("-")
    );
}
