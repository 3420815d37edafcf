use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use thiserror::Error;

use crate::Params;

pub type StageId = String;

/* --------- Errores de carga / validación --------- */

#[derive(Debug, Error)]
pub enum DagError {
    #[error("payload de DAG inválido: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("stage duplicado: {0}")]
    DuplicateStage(StageId),

    #[error("dependencia no encontrada: {dependency} (referenciada por {stage})")]
    DependencyNotFound { stage: StageId, dependency: StageId },

    #[error("el DAG contiene un ciclo: {}", path.join(" -> "))]
    Cycle { path: Vec<StageId> },
}

/* --------- Stage --------- */

/// Etapa lógica del DAG: operación, parámetros, particiones y dependencias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,

    /// Nombre de la operación que ejecuta el worker ("read_csv", "wordcount", ...).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub op: String,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Params::is_empty"
    )]
    pub params: Params,

    /// Cantidad de particiones. Ausente o <= 0 se trata como 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<i64>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<StageId>,
}

impl Stage {
    pub fn new(id: impl Into<StageId>, op: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            op: op.into(),
            params: Params::new(),
            partitions: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_partitions(mut self, partitions: i64) -> Self {
        self.partitions = Some(partitions);
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StageId>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Particiones efectivas (mínimo 1).
    pub fn partition_count(&self) -> u32 {
        match self.partitions {
            Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
            _ => 1,
        }
    }

    /// Un stage fuente no tiene dependencias.
    pub fn is_source(&self) -> bool {
        self.dependencies.is_empty()
    }
}

// "dependencies": null y "params": null se normalizan a vacío
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/* --------- Forma JSON del DAG --------- */

/// Payload tal como llega: `{"stages": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DagDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub stages: Vec<Stage>,
}

impl DagDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DagError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/* --------- DAG --------- */

/// Grafo de stages indexado por id.
///
/// Un `Dag` obtenido con [`Dag::load`] (o deserializado) ya pasó la
/// validación referencial y la de aciclicidad. [`Dag::from_stages`] sólo
/// verifica ids y referencias, para herramientas que quieren reportar el
/// ciclo por separado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DagDocument", into = "DagDocument")]
pub struct Dag {
    stages: BTreeMap<StageId, Stage>,
}

impl Dag {
    /// Parsea y valida completamente un DAG.
    pub fn load(bytes: &[u8]) -> Result<Self, DagError> {
        Self::try_from(DagDocument::from_slice(bytes)?)
    }

    /// Arma el grafo verificando ids únicos y que cada dependencia exista.
    /// No verifica ciclos.
    pub fn from_stages<I>(stages: I) -> Result<Self, DagError>
    where
        I: IntoIterator<Item = Stage>,
    {
        let mut map = BTreeMap::new();
        for stage in stages {
            if map.contains_key(&stage.id) {
                return Err(DagError::DuplicateStage(stage.id));
            }
            map.insert(stage.id.clone(), stage);
        }

        for stage in map.values() {
            if let Some(dep) = stage.dependencies.iter().find(|d| !map.contains_key(*d)) {
                return Err(DagError::DependencyNotFound {
                    stage: stage.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        Ok(Self { stages: map })
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.get(id)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.values()
    }

    /// Stages sin dependencias.
    pub fn sources(&self) -> impl Iterator<Item = &Stage> {
        self.stages.values().filter(|s| s.is_source())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_ok()
    }

    /// Orden topológico (Kahn). Si hay ciclo devuelve `DagError::Cycle`
    /// con un camino testigo.
    pub fn topological_order(&self) -> Result<Vec<&str>, DagError> {
        // in-degree de un stage = cantidad de dependencias que lista
        let mut in_degree: HashMap<&str, usize> = self
            .stages
            .values()
            .map(|s| (s.id.as_str(), s.dependencies.len()))
            .collect();

        // dep -> stages que dependen de él
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for stage in self.stages.values() {
            for dep in &stage.dependencies {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(stage.id.as_str());
            }
        }

        let mut ready: VecDeque<&str> = self
            .stages
            .keys()
            .map(String::as_str)
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();

        let mut order = Vec::with_capacity(self.stages.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);

            for &child in dependents.get(id).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push_back(child);
                    }
                }
            }
        }

        if order.len() == self.stages.len() {
            return Ok(order);
        }

        let start = in_degree
            .iter()
            .filter(|(_, deg)| **deg > 0)
            .map(|(id, _)| *id)
            .min()
            .unwrap_or_default();

        Err(DagError::Cycle {
            path: self.cycle_witness(start, &in_degree),
        })
    }

    /// Recorre dependencias no resueltas desde `start` hasta repetir un nodo.
    /// Todo stage no resuelto tiene al menos una dependencia no resuelta, así
    /// que el recorrido siempre termina en un nodo repetido.
    fn cycle_witness(&self, start: &str, unresolved: &HashMap<&str, usize>) -> Vec<StageId> {
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut current = start;

        loop {
            path.push(current);
            if !on_path.insert(current) {
                break;
            }

            let next = self.stages.get(current).and_then(|s| {
                s.dependencies
                    .iter()
                    .map(String::as_str)
                    .find(|d| unresolved.get(d).is_some_and(|deg| *deg > 0))
            });

            match next {
                Some(n) => current = n,
                None => break,
            }
        }

        path.into_iter().map(str::to_owned).collect()
    }
}

impl TryFrom<DagDocument> for Dag {
    type Error = DagError;

    fn try_from(doc: DagDocument) -> Result<Self, Self::Error> {
        let dag = Self::from_stages(doc.stages)?;
        dag.topological_order()?;
        Ok(dag)
    }
}

impl From<Dag> for DagDocument {
    fn from(dag: Dag) -> Self {
        Self {
            stages: dag.stages.into_values().collect(),
        }
    }
}
