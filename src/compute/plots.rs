//! The fixed enumeration of compute-mode plots, including the four
//! roofline variants and their by-kernel/by-dispatch grouping rule.

use super::truncate_tick_label;
use crate::error::{ControllerError, Result};
use crate::handle::{Handle, MemoryUsage, ObjectKind, PropertyAccess, PropertyId};

pub mod prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const KIND: u32 = ObjectKind::Plot.block_first() + PROP_FIRST_RESERVED;
    pub const X_AXIS_TITLE: u32 = KIND + 1;
    pub const Y_AXIS_TITLE: u32 = KIND + 2;
    pub const NUM_TICK_LABELS: u32 = KIND + 3;
    pub const TICK_LABEL_INDEXED: u32 = KIND + 4;
    pub const NUM_SERIES: u32 = KIND + 5;
    pub const SERIES_INDEXED: u32 = KIND + 6;
}

pub mod series_prop {
    use crate::handle::{ObjectKind, PROP_FIRST_RESERVED};

    pub const NAME: u32 = ObjectKind::PlotSeries.block_first() + PROP_FIRST_RESERVED;
    pub const NUM_POINTS: u32 = NAME + 1;
    pub const POINT_X_INDEXED: u32 = NAME + 2;
    pub const POINT_Y_INDEXED: u32 = NAME + 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputePlotKind {
    PerKernelDurationPie,
    PerKernelDurationBar,
    CacheSpeedOfLightBars,
    InstructionMixBars,
    RooflineFp64,
    RooflineFp32,
    RooflineFp16,
    RooflineInt8,
}

impl ComputePlotKind {
    pub const fn code(self) -> u64 {
        match self {
            ComputePlotKind::PerKernelDurationPie => 0,
            ComputePlotKind::PerKernelDurationBar => 1,
            ComputePlotKind::CacheSpeedOfLightBars => 2,
            ComputePlotKind::InstructionMixBars => 3,
            ComputePlotKind::RooflineFp64 => 4,
            ComputePlotKind::RooflineFp32 => 5,
            ComputePlotKind::RooflineFp16 => 6,
            ComputePlotKind::RooflineInt8 => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RooflineGrouping {
    ByKernel,
    ByDispatch,
}

#[derive(Debug, Clone)]
pub struct Series {
    pub id: u64,
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            points: Vec::new(),
        }
    }
}

impl MemoryUsage for Series {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        (std::mem::size_of::<Self>() + self.points.len() * std::mem::size_of::<(f64, f64)>()) as u64
    }
}

impl PropertyAccess for Series {
    fn kind(&self) -> ObjectKind {
        ObjectKind::PlotSeries
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == series_prop::NUM_POINTS => Ok(self.points.len() as u64),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        match p.id {
            id if id == series_prop::POINT_X_INDEXED => self
                .points
                .get(p.index as usize)
                .map(|(x, _)| *x)
                .ok_or(ControllerError::OutOfRange { index: p.index, num_entries: self.points.len() as u64 }),
            id if id == series_prop::POINT_Y_INDEXED => self
                .points
                .get(p.index as usize)
                .map(|(_, y)| *y)
                .ok_or(ControllerError::OutOfRange { index: p.index, num_entries: self.points.len() as u64 }),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        match p.id {
            id if id == series_prop::NAME => Ok(self.name.clone()),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        Err(ControllerError::InvalidEnum(p.id))
    }
}

#[derive(Debug, Clone)]
pub struct Plot {
    pub id: u64,
    pub kind: ComputePlotKind,
    pub x_axis_title: String,
    pub y_axis_title: String,
    pub tick_labels: Vec<String>,
    pub series: Vec<Series>,
}

impl Plot {
    pub fn new(
        id: u64,
        kind: ComputePlotKind,
        x_axis_title: impl Into<String>,
        y_axis_title: impl Into<String>,
        tick_labels: Vec<String>,
    ) -> Self {
        Self {
            id,
            kind,
            x_axis_title: x_axis_title.into(),
            y_axis_title: y_axis_title.into(),
            tick_labels: tick_labels.iter().map(|l| truncate_tick_label(l)).collect(),
            series: Vec::new(),
        }
    }

    /// A series is the scatter overlay for `grouping` when its name contains
    /// the matching keyword; every other series is a ceiling line and is
    /// always shown regardless of the selected grouping.
    pub fn visible_series(&self, grouping: RooflineGrouping) -> Vec<&Series> {
        let keyword = match grouping {
            RooflineGrouping::ByKernel => "Kernel",
            RooflineGrouping::ByDispatch => "Dispatch",
        };
        self.series
            .iter()
            .filter(|s| !is_scatter_overlay(&s.name) || s.name.contains(keyword))
            .collect()
    }
}

fn is_scatter_overlay(name: &str) -> bool {
    name.contains("Kernel") || name.contains("Dispatch")
}

impl MemoryUsage for Plot {
    fn memory_usage_inclusive(&self) -> u64 {
        self.memory_usage_exclusive() + self.series.iter().map(Series::memory_usage_inclusive).sum::<u64>()
    }

    fn memory_usage_exclusive(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

impl PropertyAccess for Plot {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Plot
    }

    fn get_u64(&self, p: PropertyId) -> Result<u64> {
        if let Ok(v) = self.get_universal_u64(p) {
            return Ok(v);
        }
        match p.id {
            id if id == prop::KIND => Ok(self.kind.code()),
            id if id == prop::NUM_TICK_LABELS => Ok(self.tick_labels.len() as u64),
            id if id == prop::NUM_SERIES => Ok(self.series.len() as u64),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_f64(&self, p: PropertyId) -> Result<f64> {
        Err(ControllerError::InvalidEnum(p.id))
    }

    fn get_string(&self, p: PropertyId) -> Result<String> {
        match p.id {
            id if id == prop::X_AXIS_TITLE => Ok(self.x_axis_title.clone()),
            id if id == prop::Y_AXIS_TITLE => Ok(self.y_axis_title.clone()),
            id if id == prop::TICK_LABEL_INDEXED => self
                .tick_labels
                .get(p.index as usize)
                .cloned()
                .ok_or(ControllerError::OutOfRange { index: p.index, num_entries: self.tick_labels.len() as u64 }),
            _ => Err(ControllerError::InvalidEnum(p.id)),
        }
    }

    fn get_object(&self, p: PropertyId) -> Result<Handle> {
        if p.id == prop::SERIES_INDEXED {
            let series = self.series.get(p.index as usize).ok_or(ControllerError::OutOfRange {
                index: p.index,
                num_entries: self.series.len() as u64,
            })?;
            return Ok(Handle::new(ObjectKind::PlotSeries, series.id));
        }
        Err(ControllerError::InvalidEnum(p.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roofline_plot() -> Plot {
        let mut plot = Plot::new(1, ComputePlotKind::RooflineFp32, "Arithmetic Intensity", "GFLOP/s", vec![]);
        plot.series.push(Series::new(1, "Peak FP32"));
        plot.series.push(Series::new(2, "Memory Bound Ceiling"));
        plot.series.push(Series::new(3, "Per-Kernel Scatter"));
        plot.series.push(Series::new(4, "Per-Dispatch Scatter"));
        plot
    }

    #[test]
    fn ceilings_are_always_shown() {
        let plot = roofline_plot();
        let visible = plot.visible_series(RooflineGrouping::ByKernel);
        assert!(visible.iter().any(|s| s.name == "Peak FP32"));
        assert!(visible.iter().any(|s| s.name == "Memory Bound Ceiling"));
    }

    #[test]
    fn by_kernel_grouping_hides_dispatch_scatter() {
        let plot = roofline_plot();
        let visible = plot.visible_series(RooflineGrouping::ByKernel);
        assert!(visible.iter().any(|s| s.name == "Per-Kernel Scatter"));
        assert!(!visible.iter().any(|s| s.name == "Per-Dispatch Scatter"));
    }

    #[test]
    fn tick_labels_are_truncated_on_construction() {
        let plot = Plot::new(
            1,
            ComputePlotKind::InstructionMixBars,
            "x",
            "y",
            vec!["y".repeat(60)],
        );
        assert_eq!(plot.tick_labels[0].chars().count(), 41);
    }

    #[test]
    fn series_indexed_resolves_to_a_plot_series_handle_carrying_the_series_own_id() {
        let plot = roofline_plot();
        let handle = plot.get_object(PropertyId::indexed(prop::SERIES_INDEXED, 2)).unwrap();
        assert_eq!(handle, Handle::new(ObjectKind::PlotSeries, 3));
    }

    #[test]
    fn series_exposes_its_points_through_indexed_f64_properties() {
        let mut series = Series::new(1, "Peak FP32");
        series.points.push((1.0, 2.0));
        series.points.push((3.0, 4.0));
        assert_eq!(series.get_f64(PropertyId::indexed(series_prop::POINT_X_INDEXED, 1)).unwrap(), 3.0);
        assert_eq!(series.get_f64(PropertyId::indexed(series_prop::POINT_Y_INDEXED, 1)).unwrap(), 4.0);
    }
}
