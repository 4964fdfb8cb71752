use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Registro del índice de audio: uno por entrada del namespace de audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    pub key: String,
    pub size: u64,
    pub cached_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl IndexRecord {
    pub fn new(key: impl Into<String>, size: u64, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            size,
            cached_at: now,
            last_accessed: now,
        }
    }
}

/// Orden de desalojo: el acceso más antiguo primero, empates por clave.
fn eviction_order(a: &IndexRecord, b: &IndexRecord) -> Ordering {
    a.last_accessed
        .cmp(&b.last_accessed)
        .then_with(|| a.key.cmp(&b.key))
}

/// Directorio en memoria del namespace de audio.
///
/// No se persiste: tras un reinicio empieza vacío (`loaded == false`) y se
/// reconstruye desde el store en el primer uso.
#[derive(Debug, Default)]
pub struct AudioIndex {
    records: HashMap<String, IndexRecord>,
    total_size: u64,
    loaded: bool,
}

impl AudioIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Reemplaza todo el contenido y marca el índice como cargado.
    pub fn load(&mut self, records: impl IntoIterator<Item = IndexRecord>) {
        self.records.clear();
        self.total_size = 0;
        for record in records {
            self.insert(record);
        }
        self.loaded = true;
    }

    /// Vacía el índice; sigue cargado porque refleja un namespace vacío.
    pub fn clear(&mut self) {
        self.records.clear();
        self.total_size = 0;
        self.loaded = true;
    }

    pub fn insert(&mut self, record: IndexRecord) -> Option<IndexRecord> {
        self.total_size += record.size;
        let previous = self.records.insert(record.key.clone(), record);
        if let Some(old) = &previous {
            self.total_size = self.total_size.saturating_sub(old.size);
        }
        previous
    }

    pub fn remove(&mut self, key: &str) -> Option<IndexRecord> {
        let removed = self.records.remove(key);
        if let Some(record) = &removed {
            self.total_size = self.total_size.saturating_sub(record.size);
        }
        removed
    }

    /// Marca un acceso; devuelve `false` si la clave no está indexada.
    pub fn touch(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        match self.records.get_mut(key) {
            Some(record) => {
                record.last_accessed = now;
                true
            }
            None => false,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Registros en orden de desalojo.
    pub fn records(&self) -> Vec<IndexRecord> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by(eviction_order);
        records
    }

    /// Claves a desalojar, en orden, para que `incoming` bytes quepan en `quota`.
    ///
    /// `replacing` excluye la clave que se va a sobrescribir: su tamaño actual
    /// no cuenta porque el nuevo payload la sustituye.
    pub fn eviction_plan(&self, incoming: u64, quota: u64, replacing: Option<&str>) -> Vec<String> {
        let mut total = self.total_size;
        if let Some(record) = replacing.and_then(|key| self.records.get(key)) {
            total = total.saturating_sub(record.size);
        }

        let mut candidates: Vec<&IndexRecord> = self
            .records
            .values()
            .filter(|record| Some(record.key.as_str()) != replacing)
            .collect();
        candidates.sort_by(|a, b| eviction_order(a, b));

        let mut plan = Vec::new();
        let mut candidates = candidates.into_iter();
        while total + incoming > quota {
            let Some(victim) = candidates.next() else {
                break;
            };
            total = total.saturating_sub(victim.size);
            plan.push(victim.key.clone());
        }
        plan
    }
}
