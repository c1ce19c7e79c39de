//! JSON interchange files standing in for the structure finder and tree builder.
//!
//! For a catalog path `P`:
//! - `P.catalog.json` holds `columns`, `unit_kinds`, `simulation` and `units`;
//! - `P.tree.json` holds a `Descendant` column aligned with the catalog's halos;
//! - `P.particles.json` holds `Particle_IDs` and `Particle_Types` per halo, and
//!   optionally `Particle_Unbound` flags aligned with the IDs.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::record::{fields, Column, HaloRecord, SimulationInfo};
use crate::sources::{BaseCatalog, CatalogReader, ParticleLists, ParticleReader, PropertyBlock, TreeReader};
use crate::units::UnitTable;
use crate::HaloError;

pub const CATALOG_SUFFIX: &str = ".catalog.json";
pub const TREE_SUFFIX: &str = ".tree.json";
pub const PARTICLE_SUFFIX: &str = ".particles.json";

fn with_suffix(path: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", path, suffix))
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    columns: BTreeMap<String, Column>,
    #[serde(default)]
    unit_kinds: UnitTable,
    simulation: Option<SimulationInfo>,
    #[serde(default)]
    units: BTreeMap<String, f64>,
}

impl CatalogFile {
    fn count(&self) -> usize {
        self.columns
            .get(fields::ID)
            .or_else(|| self.columns.values().next())
            .map_or(0, Column::len)
    }
}

fn read_catalog(path: &str) -> Result<Option<CatalogFile>, HaloError> {
    let file_path = with_suffix(path, CATALOG_SUFFIX);
    if !file_path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&file_path)?;
    let catalog: CatalogFile = serde_json::from_str(&text)?;

    let count = catalog.count();
    if let Some((name, _)) = catalog.columns.iter().find(|(_, c)| c.len() != count) {
        return Err(HaloError::Other(format!(
            "{}: column {} does not have {} values",
            file_path.display(),
            name,
            count
        )));
    }
    Ok(Some(catalog))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCatalogReader;

impl CatalogReader for JsonCatalogReader {
    fn read_base_fields(
        &self,
        path: &str,
        _file_type: u32,
        wanted: &[&str],
    ) -> Result<Option<BaseCatalog>, HaloError> {
        let Some(catalog) = read_catalog(path)? else {
            return Ok(None);
        };
        let count = catalog.count();
        let columns = catalog
            .columns
            .into_iter()
            .filter(|(name, _)| wanted.contains(&name.as_str()))
            .collect();
        Ok(Some(BaseCatalog {
            count,
            columns,
            simulation: catalog.simulation,
            units: catalog.units,
        }))
    }

    fn available_fields(&self, path: &str, _file_type: u32) -> Result<Vec<String>, HaloError> {
        match read_catalog(path)? {
            Some(catalog) => Ok(catalog.columns.into_keys().collect()),
            None => Err(HaloError::MissingInput {
                snap: None,
                path: with_suffix(path, CATALOG_SUFFIX),
            }),
        }
    }

    fn read_properties(
        &self,
        path: &str,
        _file_type: u32,
        wanted: &[String],
    ) -> Result<PropertyBlock, HaloError> {
        let catalog = read_catalog(path)?.ok_or_else(|| HaloError::MissingInput {
            snap: None,
            path: with_suffix(path, CATALOG_SUFFIX),
        })?;
        let columns: BTreeMap<String, Column> = catalog
            .columns
            .into_iter()
            .filter(|(name, _)| wanted.contains(name))
            .collect();
        let unit_kinds = catalog
            .unit_kinds
            .into_iter()
            .filter(|(name, _)| columns.contains_key(name))
            .collect();
        Ok(PropertyBlock { columns, unit_kinds })
    }
}

#[derive(Debug, Deserialize)]
struct TreeFile {
    #[serde(rename = "Descendant")]
    descendant: Vec<i64>,
}

/// Descendant IDs per available snapshot, aligned with the catalog's halo order.
pub type DescendantTree = Vec<Vec<i64>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTreeReader;

impl TreeReader for JsonTreeReader {
    type Tree = DescendantTree;

    fn read_descendant_tree(&self, files: &[String], _file_type: u32) -> Result<DescendantTree, HaloError> {
        files
            .iter()
            .map(|path| {
                let file_path = with_suffix(path, TREE_SUFFIX);
                if !file_path.exists() {
                    return Err(HaloError::MissingInput { snap: None, path: file_path });
                }
                let tree: TreeFile = serde_json::from_str(&fs::read_to_string(&file_path)?)?;
                Ok(tree.descendant)
            })
            .collect()
    }

    /// `Head` is the descendant's ID, or the halo's own ID when it has none.
    /// `Tail` is the lowest-ID progenitor whose descendant is the halo, or its own ID.
    fn build_head_tail(
        &self,
        tree: &DescendantTree,
        counts: &[usize],
        records: &mut [HaloRecord],
        multiplier: i64,
    ) -> Result<(), HaloError> {
        if tree.len() != records.len() || counts.len() != records.len() {
            return Err(HaloError::InvalidArgument(format!(
                "tree covers {} snapshots, records {}, counts {}",
                tree.len(),
                records.len(),
                counts.len()
            )));
        }

        let mut progenitor_of: FxHashMap<i64, i64> = FxHashMap::default();
        for (k, record) in records.iter().enumerate() {
            let ids = record
                .ints(fields::ID)
                .ok_or_else(|| HaloError::Other(format!("snap {} has no ID column", record.snap)))?;
            if tree[k].len() != counts[k] || ids.len() != counts[k] {
                return Err(HaloError::InvalidArgument(format!(
                    "snap {}: tree has {} entries for {} halos",
                    record.snap,
                    tree[k].len(),
                    counts[k]
                )));
            }
            if let Some(bad) = ids.iter().find(|&&id| id / multiplier != record.snap as i64) {
                return Err(HaloError::InvalidArgument(format!(
                    "snap {}: ID {} is not a temporal ID for multiplier {}",
                    record.snap, bad, multiplier
                )));
            }
            for (&id, &desc) in ids.iter().zip(&tree[k]) {
                if desc >= 0 {
                    progenitor_of
                        .entry(desc)
                        .and_modify(|p| *p = (*p).min(id))
                        .or_insert(id);
                }
            }
        }

        for (k, record) in records.iter_mut().enumerate() {
            let ids = record.ints(fields::ID).map(<[i64]>::to_vec).unwrap_or_default();
            let heads: Vec<i64> = ids
                .iter()
                .zip(&tree[k])
                .map(|(&id, &desc)| if desc >= 0 { desc } else { id })
                .collect();
            let tails: Vec<i64> = ids
                .iter()
                .map(|id| progenitor_of.get(id).copied().unwrap_or(*id))
                .collect();
            record.insert_column(fields::HEAD, Column::Int(heads))?;
            record.insert_column(fields::TAIL, Column::Int(tails))?;
        }
        debug!(snapshots = records.len(), "attached head/tail links");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ParticleFile {
    #[serde(rename = "Particle_IDs")]
    particle_ids: Vec<Vec<i64>>,
    #[serde(rename = "Particle_Types")]
    particle_types: Vec<Vec<u8>>,
    #[serde(rename = "Particle_Unbound", default)]
    unbound: Option<Vec<Vec<bool>>>,
}

impl ParticleFile {
    /// Drop the particles flagged unbound. Files without flags are all bound.
    fn bound_only(mut self) -> Result<Self, HaloError> {
        let Some(unbound) = self.unbound.take() else {
            return Ok(self);
        };
        if unbound.len() != self.particle_ids.len()
            || unbound.iter().zip(&self.particle_ids).any(|(flags, ids)| flags.len() != ids.len())
        {
            return Err(HaloError::InvalidArgument(
                "Particle_Unbound is not aligned with Particle_IDs".to_string(),
            ));
        }
        for (i, flags) in unbound.iter().enumerate() {
            retain_bound(&mut self.particle_ids[i], flags);
            if let Some(types) = self.particle_types.get_mut(i) {
                retain_bound(types, flags);
            }
        }
        Ok(self)
    }
}

fn retain_bound<T>(values: &mut Vec<T>, unbound: &[bool]) {
    let mut flags = unbound.iter();
    values.retain(|_| !flags.next().copied().unwrap_or(false));
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParticleReader;

impl ParticleReader for JsonParticleReader {
    fn read_particle_lists(
        &self,
        path: &str,
        _file_type: u32,
        include_unbound: bool,
    ) -> Result<Option<ParticleLists>, HaloError> {
        let file_path = with_suffix(path, PARTICLE_SUFFIX);
        if !file_path.exists() {
            return Ok(None);
        }
        let mut file: ParticleFile = serde_json::from_str(&fs::read_to_string(&file_path)?)?;
        if !include_unbound {
            file = file.bound_only()?;
        }
        Ok(Some(ParticleLists::new(file.particle_ids, file.particle_types)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitKind;

    fn write(dir: &std::path::Path, name: &str, body: &str) -> String {
        let base = dir.join(name).to_string_lossy().to_string();
        fs::write(format!("{}{}", base, CATALOG_SUFFIX), body).unwrap();
        base
    }

    #[test]
    fn test_base_fields_filters_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "cat_000",
            r#"{"columns":{"ID":[1,2],"HostID":[-1,1],"Mass_tot":[1.5,2.0]},
                "simulation":{"h_val":0.7,"scale_factor":0.5}}"#,
        );
        let base = JsonCatalogReader
            .read_base_fields(&path, 2, &["ID", "HostID", "Structuretype"])
            .unwrap()
            .unwrap();
        assert_eq!(base.count, 2);
        assert_eq!(base.columns.len(), 2);
        assert_eq!(base.columns["HostID"], Column::Int(vec![-1, 1]));
        assert_eq!(base.simulation.unwrap().h_val, 0.7);
    }

    #[test]
    fn test_missing_catalog_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").to_string_lossy().to_string();
        assert!(JsonCatalogReader.read_base_fields(&path, 2, &["ID"]).unwrap().is_none());
        assert!(matches!(
            JsonCatalogReader.available_fields(&path, 2),
            Err(HaloError::MissingInput { .. })
        ));
    }

    #[test]
    fn test_properties_carry_unit_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "cat_001",
            r#"{"columns":{"ID":[1],"Mass_tot":[3.0],"Xc":[0.5]},
                "unit_kinds":{"Mass_tot":"mass","Xc":"length"}}"#,
        );
        let block = JsonCatalogReader
            .read_properties(&path, 2, &["Mass_tot".to_string()])
            .unwrap();
        assert_eq!(block.columns.len(), 1);
        assert_eq!(block.unit_kinds.get("Mass_tot"), Some(&UnitKind::Mass));
        assert_eq!(block.unit_kinds.get("Xc"), None);
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad", r#"{"columns":{"ID":[1,2],"Xc":[0.5]}}"#);
        assert!(JsonCatalogReader.read_base_fields(&path, 2, &["ID"]).is_err());
    }

    #[test]
    fn test_head_tail_from_descendants() {
        let m = 1000;
        let mut a = HaloRecord::available(0, 2);
        a.insert_column(fields::ID, Column::Int(vec![1, 2])).unwrap();
        let mut b = HaloRecord::available(1, 1);
        b.insert_column(fields::ID, Column::Int(vec![1001])).unwrap();
        let mut records = vec![a, b];

        let tree = vec![vec![1001, 1001], vec![-1]];
        JsonTreeReader
            .build_head_tail(&tree, &[2, 1], &mut records, m)
            .unwrap();

        assert_eq!(records[0].ints(fields::HEAD), Some(&[1001, 1001][..]));
        assert_eq!(records[0].ints(fields::TAIL), Some(&[1, 2][..]));
        assert_eq!(records[1].ints(fields::HEAD), Some(&[1001][..]));
        assert_eq!(records[1].ints(fields::TAIL), Some(&[1][..]));
    }

    #[test]
    fn test_unbound_particles_follow_the_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap_004").to_string_lossy().to_string();
        fs::write(
            format!("{}{}", path, PARTICLE_SUFFIX),
            r#"{"Particle_IDs": [[1, 2, 3], [4]],
                "Particle_Types": [[1, 0, 1], [4]],
                "Particle_Unbound": [[false, true, false], [true]]}"#,
        )
        .unwrap();

        let all = JsonParticleReader.read_particle_lists(&path, 2, true).unwrap().unwrap();
        assert_eq!(all.npart, vec![3, 1]);

        let bound = JsonParticleReader.read_particle_lists(&path, 2, false).unwrap().unwrap();
        assert_eq!(bound.particle_ids, vec![vec![1, 3], vec![]]);
        assert_eq!(bound.particle_types, vec![vec![1, 1], vec![]]);
        assert_eq!(bound.npart, vec![2, 0]);
    }

    #[test]
    fn test_particles_without_binding_state_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap_005").to_string_lossy().to_string();
        fs::write(
            format!("{}{}", path, PARTICLE_SUFFIX),
            r#"{"Particle_IDs": [[1, 2]], "Particle_Types": [[1, 1]]}"#,
        )
        .unwrap();
        let lists = JsonParticleReader.read_particle_lists(&path, 2, false).unwrap().unwrap();
        assert_eq!(lists.particle_ids, vec![vec![1, 2]]);

        fs::write(
            format!("{}{}", path, PARTICLE_SUFFIX),
            r#"{"Particle_IDs": [[1, 2]], "Particle_Types": [[1, 1]], "Particle_Unbound": [[true]]}"#,
        )
        .unwrap();
        assert!(matches!(
            JsonParticleReader.read_particle_lists(&path, 2, false),
            Err(HaloError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_head_tail_rejects_local_ids() {
        let mut a = HaloRecord::available(1, 1);
        a.insert_column(fields::ID, Column::Int(vec![3])).unwrap();
        let mut records = vec![a];
        let err = JsonTreeReader.build_head_tail(&vec![vec![-1]], &[1], &mut records, 1000);
        assert!(matches!(err, Err(HaloError::InvalidArgument(_))));
    }
}
