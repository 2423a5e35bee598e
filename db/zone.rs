// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Detection zones and the gates that decide which detections count.
//!
//! Zones are polygons over normalized `[0,1]²` coordinates, stored per
//! stream. A detection passes if its center lies inside at least one
//! enabled zone (even-odd winding rule), its label is allowed by that
//! zone, and its confidence clears the zone's minimum.

use base::time::Time;
use base::{bail_t, ErrorKind, ResultExt as _};
use rusqlite::{named_params, Connection};
use std::ops::Range;

/// A detection in normalized coordinates, as produced by the detection
/// collaborator. `(x, y)` is the top-left corner.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Detection {
    fn center(&self) -> (f64, f64) {
        (
            f64::from(self.x) + f64::from(self.w) / 2.0,
            f64::from(self.y) + f64::from(self.h) / 2.0,
        )
    }
}

/// A stored detection row.
#[derive(Clone, Debug)]
pub struct DetectionRow {
    pub id: i64,
    pub stream_name: String,
    pub timestamp: Time,
    pub detection: Detection,
}

/// A detection zone as stored.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    pub id: i64,
    pub stream_name: String,
    pub enabled: bool,
    pub min_confidence: f32,

    /// Comma-separated class allowlist; `None` or empty allows every class.
    pub classes: Option<String>,

    /// At least three `[x, y]` vertices.
    pub polygon: Vec<[f64; 2]>,
}

impl Zone {
    fn allows_label(&self, label: &str) -> bool {
        match self.classes.as_deref() {
            None | Some("") => true,
            Some(list) => list.split(',').any(|c| c.trim() == label),
        }
    }

    fn accepts(&self, d: &Detection) -> bool {
        if !self.enabled {
            return false;
        }
        let (cx, cy) = d.center();
        point_in_polygon(cx, cy, &self.polygon)
            && self.allows_label(&d.label)
            && d.confidence >= self.min_confidence
    }
}

/// A zone to pass to `LockedDatabase::save_detection_zones`.
#[derive(Clone, Debug)]
pub struct ZoneToInsert {
    pub enabled: bool,
    pub min_confidence: f32,
    pub classes: Option<String>,
    pub polygon: Vec<[f64; 2]>,
}

/// Even-odd winding rule over a closed polygon. Points exactly on an edge
/// land on whichever side floating point puts them; zones are drawn with
/// slack, so this doesn't matter in practice.
fn point_in_polygon(x: f64, y: f64, poly: &[[f64; 2]]) -> bool {
    let n = poly.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (poly[i][0], poly[i][1]);
        let (xj, yj) = (poly[j][0], poly[j][1]);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Retains only the detections accepted by at least one zone. With no zones
/// configured, everything is kept.
pub fn filter_by_zones(zones: &[Zone], detections: &mut Vec<Detection>) {
    if zones.is_empty() {
        return;
    }
    detections.retain(|d| zones.iter().any(|z| z.accepts(d)));
}

/// Applies a stream's object include/exclude list in place.
pub fn apply_object_filter(
    mode: crate::json::ObjectFilter,
    list: &str,
    detections: &mut Vec<Detection>,
) {
    use crate::json::ObjectFilter;
    let in_list = |label: &str| list.split(',').any(|c| c.trim() == label);
    match mode {
        ObjectFilter::None => {}
        ObjectFilter::Include => detections.retain(|d| in_list(&d.label)),
        ObjectFilter::Exclude => detections.retain(|d| !in_list(&d.label)),
    }
}

/// Replaces all zones for a stream. Runs under a savepoint so it nests
/// inside an explicit catalog transaction.
pub(crate) fn save_zones(
    conn: &Connection,
    stream_name: &str,
    zones: &[ZoneToInsert],
) -> Result<(), base::Error> {
    for z in zones {
        if z.polygon.len() < 3 {
            bail_t!(
                InvalidArgument,
                "zone polygon needs at least 3 vertices, got {}",
                z.polygon.len()
            );
        }
        if !(0.0..=1.0).contains(&z.min_confidence) {
            bail_t!(
                InvalidArgument,
                "zone min_confidence {} out of [0, 1]",
                z.min_confidence
            );
        }
    }
    conn.execute_batch("savepoint save_zones")
        .err_kind(ErrorKind::Internal)?;
    let r = save_zones_inner(conn, stream_name, zones);
    match r {
        Ok(()) => conn
            .execute_batch("release save_zones")
            .err_kind(ErrorKind::Internal),
        Err(e) => {
            let _ = conn.execute_batch("rollback to save_zones; release save_zones");
            Err(e)
        }
    }
}

fn save_zones_inner(
    conn: &Connection,
    stream_name: &str,
    zones: &[ZoneToInsert],
) -> Result<(), base::Error> {
    conn.prepare_cached("delete from detection_zone where stream_name = :stream_name")
        .err_kind(ErrorKind::Internal)?
        .execute(named_params! {":stream_name": stream_name})
        .err_kind(ErrorKind::Internal)?;
    let mut stmt = conn
        .prepare_cached(
            r#"
            insert into detection_zone (stream_name,  enabled,  min_confidence,
                                        zone_classes,  polygon)
                                values (:stream_name, :enabled, :min_confidence,
                                        :zone_classes, :polygon)
            "#,
        )
        .err_kind(ErrorKind::Internal)?;
    for z in zones {
        let polygon =
            serde_json::to_string(&z.polygon).expect("vec of coordinate pairs is serializable");
        stmt.execute(named_params! {
            ":stream_name": stream_name,
            ":enabled": z.enabled,
            ":min_confidence": f64::from(z.min_confidence),
            ":zone_classes": &z.classes,
            ":polygon": polygon,
        })
        .err_kind(ErrorKind::Internal)?;
    }
    Ok(())
}

pub(crate) fn list_zones(conn: &Connection, stream_name: &str) -> Result<Vec<Zone>, base::Error> {
    let mut stmt = conn
        .prepare_cached(
            r#"
            select id, enabled, min_confidence, zone_classes, polygon
            from detection_zone
            where stream_name = :stream_name
            order by id
            "#,
        )
        .err_kind(ErrorKind::Internal)?;
    let mut rows = stmt
        .query(named_params! {":stream_name": stream_name})
        .err_kind(ErrorKind::Internal)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
        let polygon_json: String = row.get(4).err_kind(ErrorKind::Internal)?;
        let polygon: Vec<[f64; 2]> =
            serde_json::from_str(&polygon_json).err_kind(ErrorKind::DataLoss)?;
        out.push(Zone {
            id: row.get(0).err_kind(ErrorKind::Internal)?,
            stream_name: stream_name.to_owned(),
            enabled: row.get(1).err_kind(ErrorKind::Internal)?,
            min_confidence: row.get::<_, f64>(2).err_kind(ErrorKind::Internal)? as f32,
            classes: row.get(3).err_kind(ErrorKind::Internal)?,
            polygon,
        });
    }
    Ok(out)
}

pub(crate) fn insert_detection(
    conn: &Connection,
    stream_name: &str,
    timestamp: Time,
    d: &Detection,
) -> Result<i64, base::Error> {
    let mut stmt = conn
        .prepare_cached(
            r#"
            insert into detection (stream_name,  timestamp,  label,  confidence,  x,  y,  w,  h)
                           values (:stream_name, :timestamp, :label, :confidence, :x, :y, :w, :h)
            "#,
        )
        .err_kind(ErrorKind::Internal)?;
    stmt.execute(named_params! {
        ":stream_name": stream_name,
        ":timestamp": timestamp.0,
        ":label": &d.label,
        ":confidence": f64::from(d.confidence),
        ":x": f64::from(d.x),
        ":y": f64::from(d.y),
        ":w": f64::from(d.w),
        ":h": f64::from(d.h),
    })
    .err_kind(ErrorKind::Internal)?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn list_detections(
    conn: &Connection,
    stream_name: &str,
    range: Range<Time>,
) -> Result<Vec<DetectionRow>, base::Error> {
    let mut stmt = conn
        .prepare_cached(
            r#"
            select id, timestamp, label, confidence, x, y, w, h
            from detection
            where stream_name = :stream_name and timestamp >= :start and timestamp < :end
            order by timestamp
            "#,
        )
        .err_kind(ErrorKind::Internal)?;
    let mut rows = stmt
        .query(named_params! {
            ":stream_name": stream_name,
            ":start": range.start.0,
            ":end": range.end.0,
        })
        .err_kind(ErrorKind::Internal)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().err_kind(ErrorKind::Internal)? {
        out.push(DetectionRow {
            id: row.get(0).err_kind(ErrorKind::Internal)?,
            stream_name: stream_name.to_owned(),
            timestamp: Time(row.get(1).err_kind(ErrorKind::Internal)?),
            detection: Detection {
                label: row.get(2).err_kind(ErrorKind::Internal)?,
                confidence: row.get::<_, f64>(3).err_kind(ErrorKind::Internal)? as f32,
                x: row.get::<_, f64>(4).err_kind(ErrorKind::Internal)? as f32,
                y: row.get::<_, f64>(5).err_kind(ErrorKind::Internal)? as f32,
                w: row.get::<_, f64>(6).err_kind(ErrorKind::Internal)? as f32,
                h: row.get::<_, f64>(7).err_kind(ErrorKind::Internal)? as f32,
            },
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::ObjectFilter;
    use crate::testutil;
    use base::clock::SimulatedClocks;

    fn square_zone(min_confidence: f32, classes: Option<&str>) -> Zone {
        Zone {
            id: 1,
            stream_name: "s".to_owned(),
            enabled: true,
            min_confidence,
            classes: classes.map(str::to_owned),
            polygon: vec![[0.0, 0.0], [0.5, 0.0], [0.5, 0.5], [0.0, 0.5]],
        }
    }

    fn det(label: &str, confidence: f32, cx: f32, cy: f32) -> Detection {
        // Zero-sized box so the center is exactly (cx, cy).
        Detection {
            label: label.to_owned(),
            confidence,
            x: cx,
            y: cy,
            w: 0.0,
            h: 0.0,
        }
    }

    #[test]
    fn zone_in_and_out() {
        let zones = [square_zone(0.0, None)];
        let mut ds = vec![det("person", 0.9, 0.15, 0.15), det("person", 0.9, 0.75, 0.75)];
        filter_by_zones(&zones, &mut ds);
        assert_eq!(ds.len(), 1);
        assert_eq!((ds[0].x, ds[0].y), (0.15, 0.15));
    }

    #[test]
    fn zone_confidence_threshold() {
        let zones = [square_zone(0.8, None)];
        let mut ds = vec![det("person", 0.5, 0.1, 0.1)];
        filter_by_zones(&zones, &mut ds);
        assert!(ds.is_empty());

        let mut ds = vec![det("person", 0.95, 0.1, 0.1)];
        filter_by_zones(&zones, &mut ds);
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn zone_class_allowlist() {
        let zones = [square_zone(0.0, Some("person, car"))];
        let mut ds = vec![det("person", 0.9, 0.1, 0.1), det("dog", 0.9, 0.1, 0.1)];
        filter_by_zones(&zones, &mut ds);
        assert_eq!(ds.len(), 1);
        assert_eq!(ds[0].label, "person");
    }

    #[test]
    fn disabled_zone_rejects_but_empty_config_accepts() {
        let mut zone = square_zone(0.0, None);
        zone.enabled = false;
        let mut ds = vec![det("person", 0.9, 0.1, 0.1)];
        filter_by_zones(&[zone], &mut ds);
        assert!(ds.is_empty());

        let mut ds = vec![det("person", 0.9, 0.9, 0.9)];
        filter_by_zones(&[], &mut ds);
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn concave_polygon_even_odd() {
        // A "U" shape; the notch between the arms is outside.
        let poly = vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.7, 1.0],
            [0.7, 0.3],
            [0.3, 0.3],
            [0.3, 1.0],
            [0.0, 1.0],
        ];
        assert!(point_in_polygon(0.15, 0.9, &poly)); // left arm
        assert!(point_in_polygon(0.85, 0.9, &poly)); // right arm
        assert!(!point_in_polygon(0.5, 0.9, &poly)); // notch
        assert!(point_in_polygon(0.5, 0.15, &poly)); // base
    }

    #[test]
    fn object_filter_modes() {
        let mk = || {
            vec![
                det("person", 0.9, 0.1, 0.1),
                det("car", 0.9, 0.1, 0.1),
                det("dog", 0.9, 0.1, 0.1),
            ]
        };
        let mut ds = mk();
        apply_object_filter(ObjectFilter::None, "person", &mut ds);
        assert_eq!(ds.len(), 3);

        let mut ds = mk();
        apply_object_filter(ObjectFilter::Include, "person,car", &mut ds);
        assert_eq!(ds.len(), 2);

        let mut ds = mk();
        apply_object_filter(ObjectFilter::Exclude, "person,car", &mut ds);
        assert_eq!(ds.len(), 1);
        assert_eq!(ds[0].label, "dog");
    }

    #[test]
    fn zones_round_trip_through_catalog() {
        testutil::init();
        let db = testutil::TestDb::new(SimulatedClocks::new(time::Timespec::new(0, 0)));
        let mut l = db.db.lock();
        let zones = vec![ZoneToInsert {
            enabled: true,
            min_confidence: 0.25,
            classes: Some("person".to_owned()),
            polygon: vec![[0.1, 0.1], [0.9, 0.1], [0.5, 0.9]],
        }];
        l.save_detection_zones(testutil::TEST_STREAM_NAME, &zones)
            .unwrap();
        let loaded = l.get_detection_zones(testutil::TEST_STREAM_NAME).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].enabled);
        assert_eq!(loaded[0].min_confidence, 0.25);
        assert_eq!(loaded[0].classes.as_deref(), Some("person"));
        assert_eq!(loaded[0].polygon, zones[0].polygon);

        // Saving again replaces rather than appends.
        l.save_detection_zones(testutil::TEST_STREAM_NAME, &zones)
            .unwrap();
        assert_eq!(
            l.get_detection_zones(testutil::TEST_STREAM_NAME)
                .unwrap()
                .len(),
            1
        );

        // Degenerate polygons are rejected.
        let bad = vec![ZoneToInsert {
            enabled: true,
            min_confidence: 0.0,
            classes: None,
            polygon: vec![[0.0, 0.0], [1.0, 1.0]],
        }];
        assert_eq!(
            l.save_detection_zones(testutil::TEST_STREAM_NAME, &bad)
                .unwrap_err()
                .kind(),
            base::ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn zone_filter_requires_known_stream() {
        testutil::init();
        let db = testutil::TestDb::new(SimulatedClocks::new(time::Timespec::new(0, 0)));
        let l = db.db.lock();
        let mut ds = vec![det("person", 0.9, 0.1, 0.1)];
        assert_eq!(
            l.filter_detections_by_zones("nonexistent", &mut ds)
                .unwrap_err()
                .kind(),
            base::ErrorKind::NotFound
        );
        // The object gate treats an unknown stream as "no filter".
        l.filter_detections_by_stream_objects("nonexistent", &mut ds);
        assert_eq!(ds.len(), 1);
    }
}
