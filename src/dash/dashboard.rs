// The navigation contract consumed by the dashboard shell: six sections,
// an ordered label -> artifact mapping per section, and the process-wide
// artifact cache.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::info;
use once_cell::sync::OnceCell;
use snafu::prelude::*;

use crate::dash::*;

/// The fixed height the shell embeds every artifact at.
pub const DISPLAY_HEIGHT: u32 = 600;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Section {
    Home,
    DistributionPlots,
    Choropleths,
    BubbleMaps,
    LineGraphsNational,
    LineGraphsState,
}

pub const SECTIONS: [Section; 6] = [
    Section::Home,
    Section::DistributionPlots,
    Section::Choropleths,
    Section::BubbleMaps,
    Section::LineGraphsNational,
    Section::LineGraphsState,
];

/// One selectable chart of a section.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct MenuEntry {
    pub label: &'static str,
    pub artifact: &'static str,
}

impl Section {
    pub fn title(self) -> &'static str {
        match self {
            Section::Home => "Home",
            Section::DistributionPlots => "Distribution Plots",
            Section::Choropleths => "Choropleths",
            Section::BubbleMaps => "Bubble Maps",
            Section::LineGraphsNational => "Line Graphs (National)",
            Section::LineGraphsState => "Line Graphs (State)",
        }
    }

    /// The ordered selector entries of the section. Home offers none; it
    /// renders [`home_text`] instead.
    pub fn entries(self) -> &'static [MenuEntry] {
        match self {
            Section::Home => &[],
            Section::DistributionPlots => &[
                MenuEntry {
                    label: "Percent of COVID Deaths over Total COVID Cases",
                    artifact: "histogram_1",
                },
                MenuEntry {
                    label: "Percent Beds Occupied",
                    artifact: "histogram_2",
                },
            ],
            Section::Choropleths => &[
                MenuEntry {
                    label: "Residents Weekly Confirmed COVID-19",
                    artifact: "choropleth_1",
                },
                MenuEntry {
                    label: "Residents Weekly COVID-19 Deaths",
                    artifact: "choropleth_2",
                },
                MenuEntry {
                    label: "Shortage of Nursing Staff",
                    artifact: "choropleth_3",
                },
                MenuEntry {
                    label: "Shortage of Aides",
                    artifact: "choropleth_4",
                },
            ],
            Section::BubbleMaps => &[
                MenuEntry {
                    label: "Residents Weekly Confirmed COVID-19",
                    artifact: "bubblemap_1",
                },
                MenuEntry {
                    label: "Residents Weekly COVID-19 Deaths",
                    artifact: "bubblemap_2",
                },
            ],
            Section::LineGraphsNational => &[
                MenuEntry {
                    label: "Residents Weekly COVID-19 Cases and Deaths",
                    artifact: "line_graph_1",
                },
                MenuEntry {
                    label: "Percent Beds Occupied",
                    artifact: "line_graph_2",
                },
                MenuEntry {
                    label: "Percent of COVID Deaths over Total COVID Cases",
                    artifact: "line_graph_3",
                },
            ],
            Section::LineGraphsState => &[
                MenuEntry {
                    label: "Residents Weekly COVID-19 Deaths",
                    artifact: "line_graph_state_1",
                },
                MenuEntry {
                    label: "Residents Weekly Confirmed COVID-19",
                    artifact: "line_graph_state_2",
                },
                MenuEntry {
                    label: "Percent Beds Occupied",
                    artifact: "line_graph_state_3",
                },
                MenuEntry {
                    label: "Percent of COVID Deaths over Total COVID Cases",
                    artifact: "line_graph_state_4",
                },
            ],
        }
    }
}

/// The text the Home section renders.
pub fn home_text() -> &'static str {
    "This dashboard visualizes the COVID-19 Nursing Home Dataset from the \
     Centers for Medicare & Medicaid Services.\n\n\
     COVID-19 has disproportionately affected residents of long-term care \
     facilities, which constitute less than 1 percent of the U.S. population \
     yet a large share of all COVID-19 deaths.\n\n\
     The charts assess the COVID-19 response in nursing homes on a national \
     and state level, to help determine whether government resources need to \
     be redirected."
}

static ARTIFACTS: OnceCell<HashMap<String, String>> = OnceCell::new();

/// The process-wide artifact catalog, keyed by artifact name.
///
/// The store is read once, on the first call; every later call returns the
/// cached catalog. Invalidation policy: never, within one process lifetime.
pub fn artifact_catalog(dir: &Path) -> DashResult<&'static HashMap<String, String>> {
    ARTIFACTS.get_or_try_init(|| load_artifacts(dir))
}

fn load_artifacts(dir: &Path) -> DashResult<HashMap<String, String>> {
    let mut artifacts: HashMap<String, String> = HashMap::new();
    let entries = fs::read_dir(dir).context(ReadingDataDirSnafu {
        path: dir.display().to_string(),
    })?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().and_then(|x| x.to_str()) != Some("html") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            let contents = fs::read_to_string(&path).context(ReadingArtifactSnafu {
                path: path.display().to_string(),
            })?;
            artifacts.insert(stem.to_string(), contents);
        }
    }
    info!("artifact catalog: {} artifacts cached", artifacts.len());
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dash::charts::CHART_NAMES;

    #[test]
    fn every_menu_entry_points_at_a_chart_of_the_catalog() {
        let mut seen: Vec<&str> = Vec::new();
        for section in SECTIONS {
            for entry in section.entries() {
                assert!(CHART_NAMES.contains(&entry.artifact), "{}", entry.artifact);
                seen.push(entry.artifact);
            }
        }
        // The mapping covers the catalog exactly once.
        seen.sort_unstable();
        let mut expected: Vec<&str> = CHART_NAMES.to_vec();
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }

    #[test]
    fn the_navigation_offers_six_sections() {
        assert_eq!(SECTIONS.len(), 6);
        assert_eq!(SECTIONS[0].title(), "Home");
        assert!(SECTIONS[0].entries().is_empty());
        assert!(!home_text().is_empty());
        assert_eq!(DISPLAY_HEIGHT, 600);
    }
}
