//! Parameter loading for hosts that configure the localizer from a file.

use crate::localizer::LocalizerParams;
use std::fs;
use std::path::Path;

/// Load a [`LocalizerParams`] record from a JSON file.
pub fn load_params(path: &Path) -> Result<LocalizerParams, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    let params: LocalizerParams = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_params_json() {
        let json = r#"{
            "grid": {
                "width": 5, "height": 5, "spacing": 1.0,
                "inner_line_thickness": 0.02,
                "outer_line_thickness": 0.05,
                "boundary_padding": 0.5
            },
            "inverse_image_scale": 2.0,
            "parallel_threshold": 0.2,
            "align": {
                "max_iterations": 10, "convergence_delta": 0.01,
                "use_max_norm": true, "max_norm_multiplier": 2.0,
                "min_initial_matches": 12, "min_final_matches": 12,
                "min_inlier_ratio": 0.5, "max_error": 5.0
            },
            "odometry": {
                "min_tracked_features": 8, "target_features": 60,
                "min_feature_separation": 8.0
            },
            "fusion": {
                "max_odometry_error": 10.0, "max_realignment_age": 3.0,
                "min_height": 0.1, "max_height": 10.0,
                "bounds_margin": 0.5, "uncertainty_floor": 1e-5
            },
            "cam_in_body": {
                "rotation": [0.0, 0.0, 0.0, 1.0],
                "translation": [0.0, 0.0, 0.0]
            }
        }"#;
        let params: LocalizerParams = serde_json::from_str(json).expect("params should parse");
        assert_eq!(params.grid.width, 5);
        assert_eq!(params.align.max_iterations, 10);
        assert_eq!(params.inverse_image_scale, 2.0);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_params(Path::new("/nonexistent/params.json")).unwrap_err();
        assert!(err.contains("/nonexistent/params.json"));
    }
}
