//! Reglas de fusión de reportes
//!
//! Lógica pura compartida por los dos reconciliadores (transaccional y
//! documental): validación del lote, decisión de autoridad, fusión de
//! incidentes y actualización del vehículo.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::models::{Incident, IncidentReport, Vehicle, VehicleDocument};
use crate::utils::errors::{ReconcileError, ReportRejection};

/// Palabras que marcan un vehículo para baja (subcadena, sin mayúsculas)
pub const DISPOSAL_KEYWORDS: [&str; 5] =
    ["dispose", "disposal", "scrap", "write off", "written off"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentChange {
    Created,
    Extended,
    Unchanged,
}

/// Validar y normalizar un lote completo
///
/// Cualquier reporte inválido rechaza el lote entero antes de mutar nada;
/// el error lista cada reporte ofensivo.
pub fn prepare_batch(reports: Vec<IncidentReport>) -> Result<Vec<IncidentReport>, ReconcileError> {
    let mut rejections = Vec::new();
    let mut prepared = Vec::with_capacity(reports.len());

    for (index, report) in reports.into_iter().enumerate() {
        if let Err(errors) = report.validate() {
            rejections.push(ReportRejection {
                index,
                registration: report.registration.trim().to_string(),
                reason: describe_rejection(&errors),
            });
            continue;
        }
        prepared.push(report.normalized());
    }

    if rejections.is_empty() {
        Ok(prepared)
    } else {
        Err(ReconcileError::Validation(rejections))
    }
}

fn describe_rejection(errors: &ValidationErrors) -> String {
    let mut reasons: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, field_errors)| {
            field_errors.iter().map(move |e| match &*e.code {
                "not_blank" => format!("{} is blank", field),
                "report_before_start" => "report date precedes start date".to_string(),
                code => format!("{} is invalid ({})", field, code),
            })
        })
        .collect();
    reasons.sort();
    reasons.join("; ")
}

/// Fecha del lote: la mayor fecha de reporte
pub fn batch_date(reports: &[IncidentReport]) -> Option<NaiveDate> {
    reports.iter().map(|r| r.report_date).max()
}

/// Un lote es autoritativo si todos sus reportes comparten fecha y esa
/// fecha no es anterior al último lote autoritativo.
pub fn is_authoritative(
    reports: &[IncidentReport],
    batch_date: NaiveDate,
    marker: Option<NaiveDate>,
) -> bool {
    let consistent = reports.iter().all(|r| r.report_date == batch_date);
    let recent_enough = marker.map_or(true, |last| batch_date >= last);
    consistent && recent_enough
}

pub fn mentions_disposal(text: &str) -> bool {
    let text = text.to_lowercase();
    DISPOSAL_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// Fusionar un reporte con el incidente existente (si lo hay)
///
/// El reporte solo sobrescribe cuando su fecha "a día de" supera la fecha
/// de fin actual: gana el más reciente, no el último en llegar, y la fecha
/// de fin nunca retrocede.
pub fn merge_incident(
    existing: Option<Incident>,
    vehicle_id: Uuid,
    report: &IncidentReport,
) -> (Incident, IncidentChange) {
    match existing {
        None => (
            Incident {
                id: Uuid::new_v4(),
                vehicle_id,
                description: report.description.clone(),
                comments: report.comments.clone(),
                start_date: report.start_date,
                end_date: report.report_date.max(report.start_date),
                estimated_end_date: report.estimated_repair_date,
            },
            IncidentChange::Created,
        ),
        Some(mut incident) if incident.end_date < report.report_date => {
            incident.description = report.description.clone();
            incident.comments = report.comments.clone();
            incident.estimated_end_date = report.estimated_repair_date;
            incident.end_date = report.report_date;
            (incident, IncidentChange::Extended)
        }
        Some(incident) => (incident, IncidentChange::Unchanged),
    }
}

/// Aplicar un reporte al vehículo (sin tocar fecha ni token)
pub fn apply_report_to_vehicle(
    vehicle: &mut Vehicle,
    report: &IncidentReport,
    authoritative: bool,
) {
    // Redescubierto: se restaura en lugar de duplicarlo
    vehicle.deleted_at = None;

    if authoritative {
        vehicle.is_off_road = true;
        vehicle.call_sign = report.call_sign.clone();
        if report.body_type.is_some() {
            vehicle.body_type = report.body_type.clone();
        }
        if report.make.is_some() {
            vehicle.make = report.make.clone();
        }
        if report.model.is_some() {
            vehicle.model = report.model.clone();
        }
    }

    if mentions_disposal(&report.description) || mentions_disposal(&report.comments) {
        vehicle.is_for_disposal = true;
    }
}

/// Vehículo nuevo a partir del primer reporte que lo menciona
pub fn vehicle_from_report(report: &IncidentReport, now: DateTime<Utc>) -> Vehicle {
    let mut vehicle = Vehicle::new(&report.registration, &report.call_sign, now);
    vehicle.body_type = report.body_type.clone();
    vehicle.make = report.make.clone();
    vehicle.model = report.model.clone();
    vehicle
}

/// Conteos del efecto de un grupo de reportes sobre un documento
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub created: bool,
    pub restored: bool,
    pub incidents_created: usize,
    pub incidents_updated: usize,
}

/// Reportes de un mismo vehículo, en orden de llegada; nunca vacío
#[derive(Debug, Clone)]
pub struct VehicleReports<'a> {
    first: &'a IncidentReport,
    rest: Vec<&'a IncidentReport>,
}

impl<'a> VehicleReports<'a> {
    pub fn new(first: &'a IncidentReport) -> Self {
        Self {
            first,
            rest: Vec::new(),
        }
    }

    pub fn push(&mut self, report: &'a IncidentReport) {
        self.rest.push(report);
    }

    pub fn first(&self) -> &'a IncidentReport {
        self.first
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a IncidentReport> + '_ {
        std::iter::once(self.first).chain(self.rest.iter().copied())
    }
}

/// Agrupar un lote por matrícula (ya normalizada)
pub fn group_by_vehicle(reports: &[IncidentReport]) -> BTreeMap<&str, VehicleReports<'_>> {
    let mut grouped: BTreeMap<&str, VehicleReports<'_>> = BTreeMap::new();
    for report in reports {
        grouped
            .entry(report.registration.as_str())
            .and_modify(|group| group.push(report))
            .or_insert_with(|| VehicleReports::new(report));
    }
    grouped
}

/// Aplicar todos los reportes de un vehículo a su documento
pub fn apply_reports_to_document(
    existing: Option<VehicleDocument>,
    reports: &VehicleReports<'_>,
    authoritative: bool,
    now: DateTime<Utc>,
) -> (VehicleDocument, DocumentOutcome) {
    let mut outcome = DocumentOutcome::default();
    let mut document = match existing {
        Some(document) => {
            outcome.restored = !document.vehicle.is_active();
            document
        }
        None => {
            outcome.created = true;
            VehicleDocument::new(vehicle_from_report(reports.first(), now))
        }
    };

    for report in reports.iter() {
        let existing = document.incident(report.start_date).cloned();
        let (incident, change) = merge_incident(existing, document.vehicle.id, report);
        match change {
            IncidentChange::Created => outcome.incidents_created += 1,
            IncidentChange::Extended => outcome.incidents_updated += 1,
            IncidentChange::Unchanged => {}
        }
        if change != IncidentChange::Unchanged {
            document.put_incident(incident);
        }
        apply_report_to_vehicle(&mut document.vehicle, report, authoritative);
    }

    (document, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, 9, 0, 0).unwrap()
    }

    fn dated(day: u32) -> IncidentReport {
        IncidentReport::new("AB12CDE", "WR1", d(1), d(day))
    }

    #[test]
    fn test_authoritative_examples() {
        let marker = Some(d(10));

        let batch = vec![dated(11), dated(11)];
        assert!(is_authoritative(&batch, d(11), marker));

        let stale = vec![dated(9)];
        assert!(!is_authoritative(&stale, d(9), marker));

        let mixed = vec![dated(11), dated(9)];
        assert_eq!(batch_date(&mixed), Some(d(11)));
        assert!(!is_authoritative(&mixed, d(11), marker));

        // Mismo día que el marcador: se acepta (re-entrega del mismo fichero)
        assert!(is_authoritative(&[dated(10)], d(10), marker));
        // Sin marcador, cualquier lote consistente es autoritativo
        assert!(is_authoritative(&[dated(3)], d(3), None));
    }

    #[test]
    fn test_prepare_batch_reports_every_offender() {
        let reports = vec![
            dated(2),
            IncidentReport::new("  ", "WR1", d(1), d(2)),
            IncidentReport::new("AB12CDE", "", d(1), d(2)),
            IncidentReport::new("AB12CDE", "WR1", d(5), d(2)),
        ];

        match prepare_batch(reports) {
            Err(ReconcileError::Validation(rejections)) => {
                let indexes: Vec<usize> = rejections.iter().map(|r| r.index).collect();
                assert_eq!(indexes, vec![1, 2, 3]);
                assert_eq!(rejections[0].reason, "registration is blank");
                assert_eq!(rejections[1].reason, "call_sign is blank");
                assert_eq!(rejections[2].reason, "report date precedes start date");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_batch_normalizes() {
        let prepared =
            prepare_batch(vec![IncidentReport::new(" ab12 cde", "wr1", d(1), d(2))]).unwrap();
        assert_eq!(prepared[0].registration, "AB12CDE");
        assert_eq!(prepared[0].call_sign, "WR1");
    }

    #[test]
    fn test_disposal_keywords() {
        assert!(mentions_disposal("Awaiting DISPOSAL"));
        assert!(mentions_disposal("to be scrapped"));
        assert!(mentions_disposal("Written Off by insurer"));
        assert!(!mentions_disposal("brake pads"));
    }

    #[test]
    fn test_merge_extends_only_with_newer_report() {
        let vehicle_id = Uuid::new_v4();
        let first = dated(5).with_description("gearbox");
        let (incident, change) = merge_incident(None, vehicle_id, &first);
        assert_eq!(change, IncidentChange::Created);
        assert_eq!(incident.end_date, d(5));

        let older = dated(3).with_description("older text");
        let (unchanged, change) = merge_incident(Some(incident.clone()), vehicle_id, &older);
        assert_eq!(change, IncidentChange::Unchanged);
        assert_eq!(unchanged.description, "gearbox");

        let newer = dated(8).with_description("gearbox replaced").with_estimated_repair(d(12));
        let (extended, change) = merge_incident(Some(incident.clone()), vehicle_id, &newer);
        assert_eq!(change, IncidentChange::Extended);
        assert_eq!(extended.id, incident.id);
        assert_eq!(extended.end_date, d(8));
        assert_eq!(extended.estimated_end_date, Some(d(12)));
    }

    #[test]
    fn test_apply_report_flags() {
        let mut vehicle = Vehicle::new("AB12CDE", "WR1", now());
        vehicle.deleted_at = Some(now());

        apply_report_to_vehicle(&mut vehicle, &dated(5).with_comments("for disposal"), false);
        assert!(vehicle.is_active());
        assert!(!vehicle.is_off_road);
        assert!(vehicle.is_for_disposal);

        apply_report_to_vehicle(&mut vehicle, &dated(6), true);
        assert!(vehicle.is_off_road);
        // La marca de baja no se revierte por esta vía
        assert!(vehicle.is_for_disposal);
    }

    #[test]
    fn test_group_by_vehicle_keeps_arrival_order() {
        let batch = vec![
            IncidentReport::new("BB22BBB", "B1", d(1), d(5)),
            IncidentReport::new("AA11AAA", "A1", d(2), d(5)),
            IncidentReport::new("BB22BBB", "B1", d(3), d(5)),
        ];
        let grouped = group_by_vehicle(&batch);

        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), vec!["AA11AAA", "BB22BBB"]);
        let starts: Vec<NaiveDate> = grouped["BB22BBB"].iter().map(|r| r.start_date).collect();
        assert_eq!(starts, vec![d(1), d(3)]);
        assert_eq!(grouped["AA11AAA"].iter().count(), 1);
    }

    #[test]
    fn test_apply_reports_to_new_document() {
        let a = dated(5);
        let b = IncidentReport::new("AB12CDE", "WR1", d(4), d(5));
        let batch = vec![a, b];
        let grouped = group_by_vehicle(&batch);
        let (document, outcome) =
            apply_reports_to_document(None, &grouped["AB12CDE"], true, now());

        assert!(outcome.created);
        assert_eq!(outcome.incidents_created, 2);
        assert_eq!(document.incidents.len(), 2);
        assert_eq!(document.incidents[0].start_date, d(1));
        assert!(document.vehicle.is_off_road);
    }

    proptest! {
        #[test]
        fn end_date_is_max_report_date_in_any_order(
            days in proptest::collection::vec(1u32..28, 1..10),
            seed in any::<u64>(),
        ) {
            let vehicle_id = Uuid::new_v4();
            let mut ordered = days.clone();
            let len = ordered.len();
            for i in 0..len {
                let j = ((seed as usize).wrapping_add(i * 31)) % len;
                ordered.swap(i, j);
            }

            let mut incident: Option<Incident> = None;
            let mut previous_end: Option<NaiveDate> = None;
            for day in &ordered {
                let (merged, _) = merge_incident(incident.take(), vehicle_id, &dated(*day));
                if let Some(previous) = previous_end {
                    prop_assert!(merged.end_date >= previous);
                }
                previous_end = Some(merged.end_date);
                incident = Some(merged);
            }

            let expected = d(*days.iter().max().unwrap());
            prop_assert_eq!(incident.unwrap().end_date, expected);
        }
    }
}
