//! Cell-addressed workbooks with live formulas.
//!
//! Summary cells are spreadsheet formulas over the participant row range, so
//! an exported file can be re-audited in any spreadsheet viewer. When a range
//! would be empty the summary falls back to literal zeros, since `A2:A1` is
//! not a valid reference.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::stats::quarter::GroupCount;
use crate::stats::{PassPolicy, QuarterReport, TrainingReport};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Cell {
    Text(String),
    Number(f64),
    /// Formula body without the leading `=`.
    Formula(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    fn render(&self) -> String {
        match self {
            Cell::Text(s) => escape_text(s),
            Cell::Number(n) if n.fract() == 0.0 => format!("{n:.0}"),
            Cell::Number(n) => n.to_string(),
            Cell::Formula(f) => format!("={f}"),
        }
    }
}

/// Text that a spreadsheet would read as a formula gets a leading `'`, so
/// only [`Cell::Formula`] cells are ever evaluated.
fn escape_text(text: &str) -> String {
    if text.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{text}")
    } else {
        text.to_string()
    }
}

/// Column letters for a zero-based index: 0 -> A, 25 -> Z, 26 -> AA.
pub fn column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// `A1` reference for a zero-based column and one-based row.
pub fn cell_ref(col: usize, row: usize) -> String {
    format!("{}{}", column_name(col), row)
}

/// Parse an `A1` reference back into (zero-based column, one-based row).
pub fn parse_ref(reference: &str) -> Result<(usize, usize)> {
    let split = reference
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| Error::Validation(format!("bad cell reference '{reference}'")))?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(Error::Validation(format!("bad cell reference '{reference}'")));
    }

    let col = letters
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize)
        - 1;
    let row = digits
        .parse::<usize>()
        .ok()
        .filter(|r| *r > 0)
        .ok_or_else(|| Error::Validation(format!("bad cell reference '{reference}'")))?;
    Ok((col, row))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Sheet {
    pub name: String,
    /// (row, col) -> cell, rows one-based.
    cells: BTreeMap<(usize, usize), Cell>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, col: usize, row: usize, cell: Cell) {
        self.cells.insert((row, col), cell);
    }

    pub fn row(&mut self, row: usize, cells: Vec<Cell>) {
        for (col, cell) in cells.into_iter().enumerate() {
            self.set(col, row, cell);
        }
    }

    pub fn get(&self, reference: &str) -> Option<&Cell> {
        let (col, row) = parse_ref(reference).ok()?;
        self.cells.get(&(row, col))
    }

    pub fn last_row(&self) -> usize {
        self.cells.keys().map(|(r, _)| *r).max().unwrap_or(0)
    }

    fn width(&self) -> usize {
        self.cells.keys().map(|(_, c)| c + 1).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Serialize every sheet one after another. Each sheet starts with its
    /// title row and sheets are separated by a blank row.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());

        for (i, sheet) in self.sheets.iter().enumerate() {
            if i > 0 {
                writer.write_record([""])?;
            }
            writer.write_record([format!("# {}", sheet.name)])?;

            let width = sheet.width();
            for row in 1..=sheet.last_row() {
                let record: Vec<String> = (0..width)
                    .map(|col| {
                        sheet
                            .cells
                            .get(&(row, col))
                            .map(Cell::render)
                            .unwrap_or_default()
                    })
                    .collect();
                writer.write_record(&record)?;
            }
        }

        writer
            .into_inner()
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
    }
}

const PARTICIPANT_HEADERS: [&str; 10] = [
    "Nombre",
    "Email",
    "Servicio",
    "Cargo",
    "Profesión",
    "Sesión",
    "Pretest",
    "Posttest",
    "Aprobado",
    "Estado",
];
const PRE_COL: usize = 6;
const POST_COL: usize = 7;
const PASS_COL: usize = 8;

/// Participant sheet plus a summary block under it.
pub fn training_workbook(report: &TrainingReport) -> Workbook {
    let policy = &report.pass_policy;
    let mut sheet = Sheet::new("Participantes");
    sheet.row(1, PARTICIPANT_HEADERS.iter().map(|h| Cell::text(*h)).collect());

    let first = 2;
    for (i, p) in report.participants.iter().enumerate() {
        let row = first + i;
        sheet.row(
            row,
            vec![
                Cell::text(&p.name),
                Cell::text(p.email.clone().unwrap_or_default()),
                Cell::text(p.department.clone().unwrap_or_default()),
                Cell::text(p.role.clone().unwrap_or_default()),
                Cell::text(p.profession.clone().unwrap_or_default()),
                Cell::text(p.session_code.clone().unwrap_or_default()),
                Cell::Number(p.pretest_score),
                Cell::Number(p.posttest_score),
                Cell::Formula(pass_formula(policy, &cell_ref(POST_COL, row))),
                Cell::text(p.status.clone().unwrap_or_default()),
            ],
        );
    }
    let last = first + report.participants.len() - 1;
    let rows = (!report.participants.is_empty()).then_some((first, last));

    let top = last + 2;
    let summary = summary_cells(rows, top);
    for (offset, (label, cell)) in summary.into_iter().enumerate() {
        sheet.row(top + offset, vec![Cell::text(label), cell]);
    }

    let mut info = Sheet::new("Capacitación");
    let training = &report.training;
    info.row(1, vec![Cell::text("Título"), Cell::text(&training.title)]);
    info.row(
        2,
        vec![
            Cell::text("Proceso"),
            Cell::text(training.process.clone().unwrap_or_default()),
        ],
    );
    info.row(
        3,
        vec![
            Cell::text("Fecha"),
            Cell::text(training.date.map(|d| d.to_string()).unwrap_or_default()),
        ],
    );
    info.row(4, vec![Cell::text("Sesiones"), Cell::Number(report.sessions.len() as f64)]);
    info.row(
        5,
        vec![
            Cell::text("Aprobación"),
            Cell::text(format!(
                "{} % de {}",
                policy.pass_percent, policy.scale
            )),
        ],
    );

    Workbook {
        sheets: vec![sheet, info],
    }
}

fn pass_formula(policy: &PassPolicy, score_ref: &str) -> String {
    format!(
        "IF(AND({score_ref}>0,{score_ref}>={}),1,0)",
        format_number(policy.threshold())
    )
}

/// Labelled summary cells for participant rows `first..=last`, laid out from
/// row `top` downwards in column B.
fn summary_cells(rows: Option<(usize, usize)>, top: usize) -> Vec<(&'static str, Cell)> {
    let Some((first, last)) = rows else {
        return [
            "Total participantes",
            "Pretest completados",
            "Posttest completados",
            "Promedio pretest",
            "Promedio posttest",
            "Aprobados",
            "Adherencia %",
            "Tasa de aprobación %",
        ]
        .into_iter()
        .map(|label| (label, Cell::Number(0.0)))
        .collect();
    };

    let range = |col: usize| format!("{}:{}", cell_ref(col, first), cell_ref(col, last));
    let total = cell_ref(1, top);
    let post_done = cell_ref(1, top + 2);
    let passed = cell_ref(1, top + 5);

    vec![
        ("Total participantes", Cell::Formula(format!("COUNTA({})", range(0)))),
        (
            "Pretest completados",
            Cell::Formula(format!("COUNTIF({},\">0\")", range(PRE_COL))),
        ),
        (
            "Posttest completados",
            Cell::Formula(format!("COUNTIF({},\">0\")", range(POST_COL))),
        ),
        (
            "Promedio pretest",
            Cell::Formula(format!(
                "IFERROR(ROUND(AVERAGEIF({},\">0\"),0),0)",
                range(PRE_COL)
            )),
        ),
        (
            "Promedio posttest",
            Cell::Formula(format!(
                "IFERROR(ROUND(AVERAGEIF({},\">0\"),0),0)",
                range(POST_COL)
            )),
        ),
        ("Aprobados", Cell::Formula(format!("SUM({})", range(PASS_COL)))),
        (
            "Adherencia %",
            Cell::Formula(format!("IF({total}=0,0,ROUND({post_done}/{total}*100,0))")),
        ),
        (
            "Tasa de aprobación %",
            Cell::Formula(format!(
                "IF({post_done}=0,0,ROUND({passed}/{post_done}*100,0))"
            )),
        ),
    ]
}

const QUARTER_HEADERS: [&str; 10] = [
    "Capacitación",
    "Proceso",
    "Fecha",
    "Sesiones",
    "Participantes",
    "Pretest completados",
    "Posttest completados",
    "Aprobados",
    "Promedio pretest",
    "Promedio posttest",
];

/// Per-training sheet with a totals row, plus one sheet per grouping.
pub fn quarter_workbook(report: &QuarterReport) -> Workbook {
    let mut sheet = Sheet::new(format!("Resumen {}", report.label));
    sheet.row(1, QUARTER_HEADERS.iter().map(|h| Cell::text(*h)).collect());

    let first = 2;
    for (i, t) in report.trainings.iter().enumerate() {
        let s = &t.statistics;
        sheet.row(
            first + i,
            vec![
                Cell::text(&t.title),
                Cell::text(t.process.clone().unwrap_or_default()),
                Cell::text(t.date.map(|d| d.to_string()).unwrap_or_default()),
                Cell::Number(t.session_count as f64),
                Cell::Number(s.total_count as f64),
                Cell::Number(s.pretest_completed_count as f64),
                Cell::Number(s.posttest_completed_count as f64),
                Cell::Number(s.passed_count as f64),
                Cell::Number(s.average_pretest as f64),
                Cell::Number(s.average_posttest as f64),
            ],
        );
    }

    let totals_row = first + report.trainings.len();
    let mut totals = vec![Cell::text("Total"), Cell::text(""), Cell::text("")];
    for col in 3..=7 {
        totals.push(if report.trainings.is_empty() {
            Cell::Number(0.0)
        } else {
            Cell::Formula(format!(
                "SUM({}:{})",
                cell_ref(col, first),
                cell_ref(col, totals_row - 1)
            ))
        });
    }
    sheet.row(totals_row, totals);

    let mut sheets = vec![sheet];
    sheets.push(group_sheet("Servicios", &report.by_department));
    sheets.push(group_sheet("Cargos", &report.by_role));
    sheets.push(group_sheet("Profesiones", &report.by_profession));
    Workbook { sheets }
}

fn group_sheet(name: &str, groups: &[GroupCount]) -> Sheet {
    let mut sheet = Sheet::new(name);
    sheet.row(1, vec![Cell::text(name), Cell::text("Participaciones")]);
    for (i, g) in groups.iter().enumerate() {
        sheet.row(2 + i, vec![Cell::text(&g.name), Cell::Number(g.count as f64)]);
    }
    let total_row = 2 + groups.len();
    let total = if groups.is_empty() {
        Cell::Number(0.0)
    } else {
        Cell::Formula(format!("SUM(B2:B{})", total_row - 1))
    };
    sheet.row(total_row, vec![Cell::text("Total"), total]);
    sheet
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}
