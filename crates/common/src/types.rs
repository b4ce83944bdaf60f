use std::path::{Path, PathBuf};

use glam::DVec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Axis-aligned spatial extent of an environment cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min: DVec3,
    pub max: DVec3,
}

impl Extent {
    /// Build an extent from two opposite corners in any order.
    pub fn new(a: DVec3, b: DVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Partition into `factor` equal parts along each axis.
    ///
    /// Cells come out x-major, then y, then z, so the same extent and factor
    /// always yield the same sequence.
    pub fn split(&self, factor: u32) -> Vec<Extent> {
        let step = self.size() / f64::from(factor);
        let mut cells = Vec::with_capacity((factor as usize).pow(3));
        for ix in 0..factor {
            for iy in 0..factor {
                for iz in 0..factor {
                    let offset = DVec3::new(f64::from(ix), f64::from(iy), f64::from(iz));
                    let min = self.min + step * offset;
                    cells.push(Extent {
                        min,
                        max: min + step,
                    });
                }
            }
        }
        cells
    }
}

impl Default for Extent {
    /// A one-degree box on the equator, 0 to 10 km altitude.
    fn default() -> Self {
        Self {
            min: DVec3::new(0.0, 0.0, 0.0),
            max: DVec3::new(1.0, 1.0, 10_000.0),
        }
    }
}

/// Unique identifier for a waypoint in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WaypointId(pub Uuid);

impl WaypointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WaypointId {
    fn default() -> Self {
        Self::new()
    }
}

/// A plan waypoint: a 3-D position plus planning metadata the core does not
/// interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: WaypointId,
    pub position: DVec3,
    pub designator: Option<String>,
}

impl Waypoint {
    pub fn new(position: DVec3) -> Self {
        Self {
            id: WaypointId::new(),
            position,
            designator: None,
        }
    }

    pub fn with_designator(mut self, designator: impl Into<String>) -> Self {
        self.designator = Some(designator.into());
        self
    }
}

/// Handle to an externally owned terrain dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerrainFile {
    path: PathBuf,
}

impl TerrainFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dataset name derived from the file stem.
    ///
    /// Fails when the path does not name a file (empty path, `..`, root).
    pub fn name(&self) -> CoreResult<String> {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "terrain path {:?} does not name a file",
                    self.path
                ))
            })
    }
}

/// Capability metadata for an environment or planner type, consumed by
/// setup presenters. The core only stores and lists these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl CapabilityDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Session-wide defaults applied when new plan elements are created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Setup {
    /// Altitude in meters given to waypoints created without one.
    pub default_altitude: f64,
    /// Cost threshold given to newly created scenarios.
    pub default_threshold: f64,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            default_altitude: 1_000.0,
            default_threshold: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waypoint_id_uniqueness() {
        assert_ne!(WaypointId::new(), WaypointId::new());
    }

    #[test]
    fn extent_normalizes_corners() {
        let e = Extent::new(DVec3::new(4.0, 0.0, 2.0), DVec3::new(0.0, 4.0, 0.0));
        assert_eq!(e.min, DVec3::new(0.0, 0.0, 0.0));
        assert_eq!(e.max, DVec3::new(4.0, 4.0, 2.0));
        assert_eq!(e.center(), DVec3::new(2.0, 2.0, 1.0));
    }

    #[test]
    fn split_by_two_is_an_octree_in_x_major_order() {
        let e = Extent::new(DVec3::ZERO, DVec3::splat(2.0));
        let cells = e.split(2);
        assert_eq!(cells.len(), 8);
        assert_eq!(cells[0].min, DVec3::ZERO);
        assert_eq!(cells[1].min, DVec3::new(0.0, 0.0, 1.0));
        assert_eq!(cells[2].min, DVec3::new(0.0, 1.0, 0.0));
        assert_eq!(cells[4].min, DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(cells[7].max, DVec3::splat(2.0));
        for cell in &cells {
            assert_eq!(cell.size(), DVec3::ONE);
        }
    }

    #[test]
    fn split_by_three_covers_27_cells() {
        let e = Extent::new(DVec3::ZERO, DVec3::splat(3.0));
        let cells = e.split(3);
        assert_eq!(cells.len(), 27);
        assert!(cells.iter().all(|c| e.contains(c.center())));
    }

    #[test]
    fn contains_is_inclusive() {
        let e = Extent::new(DVec3::ZERO, DVec3::ONE);
        assert!(e.contains(DVec3::ONE));
        assert!(!e.contains(DVec3::new(1.5, 0.5, 0.5)));
    }

    #[test]
    fn terrain_name_is_file_stem() {
        let f = TerrainFile::new("/data/dem/alps_north.dt2");
        assert_eq!(f.name().unwrap(), "alps_north");
    }

    #[test]
    fn terrain_name_rejects_non_files() {
        assert!(matches!(
            TerrainFile::new("").name(),
            Err(CoreError::Validation(_))
        ));
        assert!(TerrainFile::new("/").name().is_err());
    }

    #[test]
    fn setup_defaults() {
        let s = Setup::default();
        assert_eq!(s.default_altitude, 1_000.0);
        assert_eq!(s.default_threshold, 0.5);
    }
}
