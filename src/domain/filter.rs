use super::model::{FilterCriteria, FilterMode, ProbedImage};

/// Images smaller than this on either side count as icons.
pub const SMALL_ICON_PX: u32 = 50;

/// Pure predicate over a probed image, checked in short-circuit order:
/// small icons, GIFs, minimum dimensions, then the exact-value selection.
pub fn passes_filter(probed: &ProbedImage, criteria: &FilterCriteria) -> bool {
    if criteria.skip_small_icons && (probed.width < SMALL_ICON_PX || probed.height < SMALL_ICON_PX)
    {
        return false;
    }

    if criteria.exclude_gif && is_gif(&probed.content_type) {
        return false;
    }

    if criteria.min_width > 0 && probed.width < criteria.min_width {
        return false;
    }
    if criteria.min_height > 0 && probed.height < criteria.min_height {
        return false;
    }

    let selection = &criteria.resolution_filter;
    if selection.is_active() {
        return matches_selection(probed, selection.mode, &selection.value);
    }

    true
}

/// Exact comparison of one dimension field against a selected value.
pub fn matches_selection(probed: &ProbedImage, mode: FilterMode, value: &str) -> bool {
    matches_dimensions(&probed.resolution, probed.width, probed.height, mode, value)
}

/// [`matches_selection`] over bare dimensions, for callers without a probe.
pub fn matches_dimensions(
    resolution: &str,
    width: u32,
    height: u32,
    mode: FilterMode,
    value: &str,
) -> bool {
    let value = value.trim();
    match mode {
        FilterMode::None => true,
        FilterMode::Resolution => resolution == value,
        FilterMode::Width => value.parse::<u32>().ok() == Some(width),
        FilterMode::Height => value.parse::<u32>().ok() == Some(height),
    }
}

fn is_gif(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("image/gif"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ImageCandidate, ResolutionFilter};

    fn probed(width: u32, height: u32, content_type: &str) -> ProbedImage {
        ProbedImage::new(
            ImageCandidate::new(format!("http://e.com/{}x{}.png", width, height), "http://e.com/"),
            content_type.to_string(),
            width,
            height,
            100,
        )
    }

    #[test]
    fn default_criteria_accept_everything() {
        let criteria = FilterCriteria::default();
        assert!(passes_filter(&probed(1, 1, "image/png"), &criteria));
        assert!(passes_filter(&probed(4000, 3000, "image/gif"), &criteria));
    }

    #[test]
    fn skip_small_icons_rejects_either_side_below_threshold() {
        let criteria = FilterCriteria {
            skip_small_icons: true,
            ..Default::default()
        };
        assert!(!passes_filter(&probed(49, 500, "image/png"), &criteria));
        assert!(!passes_filter(&probed(500, 49, "image/png"), &criteria));
        assert!(passes_filter(&probed(50, 50, "image/png"), &criteria));
    }

    #[test]
    fn skip_small_icons_only_narrows_the_accepted_set() {
        let samples: Vec<ProbedImage> = [(10, 10), (49, 80), (50, 50), (120, 30), (800, 600)]
            .iter()
            .map(|&(w, h)| probed(w, h, "image/jpeg"))
            .collect();
        let loose = FilterCriteria {
            min_width: 20,
            ..Default::default()
        };
        let strict = FilterCriteria {
            skip_small_icons: true,
            ..loose.clone()
        };

        let loose_pass: Vec<_> = samples.iter().filter(|p| passes_filter(p, &loose)).collect();
        let strict_pass: Vec<_> = samples.iter().filter(|p| passes_filter(p, &strict)).collect();
        assert!(strict_pass.iter().all(|p| loose_pass.contains(p)));
        assert!(strict_pass.len() < loose_pass.len());
    }

    #[test]
    fn minimum_dimensions_are_checked_independently() {
        let criteria = FilterCriteria {
            min_width: 300,
            min_height: 0,
            ..Default::default()
        };
        assert!(!passes_filter(&probed(299, 5000, "image/png"), &criteria));
        assert!(passes_filter(&probed(300, 1, "image/png"), &criteria));

        let criteria = FilterCriteria {
            min_height: 200,
            ..Default::default()
        };
        assert!(!passes_filter(&probed(5000, 199, "image/png"), &criteria));
    }

    #[test]
    fn exclude_gif_matches_mime_with_parameters() {
        let criteria = FilterCriteria {
            exclude_gif: true,
            ..Default::default()
        };
        assert!(!passes_filter(&probed(100, 100, "image/GIF; charset=binary"), &criteria));
        assert!(passes_filter(&probed(100, 100, "image/png"), &criteria));
    }

    #[test]
    fn exact_value_selection_by_mode() {
        let image = probed(640, 480, "image/png");
        let with = |mode, value: &str| FilterCriteria {
            resolution_filter: ResolutionFilter::new(mode, value),
            ..Default::default()
        };

        assert!(passes_filter(&image, &with(FilterMode::Resolution, "640x480")));
        assert!(!passes_filter(&image, &with(FilterMode::Resolution, "480x640")));
        assert!(passes_filter(&image, &with(FilterMode::Width, "640")));
        assert!(!passes_filter(&image, &with(FilterMode::Width, "480")));
        assert!(passes_filter(&image, &with(FilterMode::Height, "480")));
        assert!(passes_filter(&image, &with(FilterMode::Height, "all")));
    }
}
