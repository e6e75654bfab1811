use std::{io::Read, path::Path};

use anyhow::Context;

use crate::models::PatientRecord;

/// Header: `id,name,age,gender,duration_sec,chunk_count,status,last_assessment`.
pub fn load_csv(path: &Path) -> anyhow::Result<Vec<PatientRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_records(file).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn read_records<R: Read>(source: R) -> anyhow::Result<Vec<PatientRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);

    let mut records = Vec::new();
    for (line, result) in reader.deserialize::<PatientRecord>().enumerate() {
        let record = result.with_context(|| format!("invalid row {}", line + 1))?;
        records.push(record);
    }

    Ok(records)
}
