use chrono::Utc;
use tera::{Context, Tera};

use crate::error::Result;
use crate::stats::{QuarterReport, TrainingReport};

pub struct HtmlRenderer {
    template_engine: Tera,
}

impl HtmlRenderer {
    pub fn new() -> Result<Self> {
        let mut template_engine = Tera::default();
        template_engine.add_raw_templates(vec![
            ("base.html", BASE_TEMPLATE),
            ("training.html", TRAINING_TEMPLATE),
            ("quarter.html", QUARTER_TEMPLATE),
        ])?;
        Ok(Self { template_engine })
    }

    pub fn training(&self, report: &TrainingReport) -> Result<String> {
        let mut context = Context::new();
        context.insert("report", report);
        context.insert("generated_at", &Utc::now().format("%Y-%m-%d %H:%M UTC").to_string());
        Ok(self.template_engine.render("training.html", &context)?)
    }

    pub fn quarter(&self, report: &QuarterReport) -> Result<String> {
        let mut context = Context::new();
        context.insert("report", report);
        context.insert("generated_at", &Utc::now().format("%Y-%m-%d %H:%M UTC").to_string());
        Ok(self.template_engine.render("quarter.html", &context)?)
    }
}

const BASE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="es">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{% block title %}Reporte{% endblock title %}</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            line-height: 1.5;
            color: #333;
            max-width: 1200px;
            margin: 0 auto;
            padding: 20px;
            background-color: #f5f5f5;
        }
        .report-header, .section {
            background-color: white;
            padding: 24px;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
            margin-bottom: 20px;
        }
        h1 { margin: 0 0 8px 0; color: #1f4e79; }
        h2 { color: #34495e; border-bottom: 2px solid #ecf0f1; padding-bottom: 8px; }
        .metadata { color: #666; font-size: 14px; }
        .metrics { display: flex; flex-wrap: wrap; gap: 16px; }
        .metric { flex: 1 1 160px; padding: 12px; background: #f8f9fa; border-radius: 6px; }
        .metric-name { font-size: 13px; color: #666; }
        .metric-value { font-size: 22px; font-weight: bold; color: #2c3e50; }
        table { width: 100%; border-collapse: collapse; }
        th, td { text-align: left; padding: 8px 10px; border-bottom: 1px solid #ecf0f1; }
        th { background-color: #f8f9fa; font-weight: 600; }
        .pass { color: #27ae60; font-weight: 600; }
        .fail { color: #e74c3c; }
        .warning { background: #fff4e5; border-left: 4px solid #f39c12; padding: 12px; }
    </style>
</head>
<body>
    {% block content %}{% endblock content %}
    <p class="metadata">Generado: {{ generated_at }}</p>
</body>
</html>
"#;

const TRAINING_TEMPLATE: &str = r#"{% extends "base.html" %}
{% block title %}{{ report.training.title }}{% endblock title %}
{% block content %}
<div class="report-header">
    <h1>{{ report.training.title }}</h1>
    <div class="metadata">
        {% if report.training.process %}<p><strong>Proceso:</strong> {{ report.training.process }}</p>{% endif %}
        {% if report.training.date %}<p><strong>Fecha:</strong> {{ report.training.date }}</p>{% endif %}
        <p><strong>Sesiones:</strong> {{ report.sessions | length }}</p>
    </div>
</div>

{% if report.degraded %}
<div class="section warning">
    Datos incompletos: no se pudo leer {{ report.degraded | join(sep=", ") }}.
</div>
{% endif %}

<div class="section">
    <h2>Resumen</h2>
    <div class="metrics">
        <div class="metric"><div class="metric-name">Participantes</div><div class="metric-value">{{ report.statistics.totalCount }}</div></div>
        <div class="metric"><div class="metric-name">Pretest completados</div><div class="metric-value">{{ report.statistics.pretestCompletedCount }}</div></div>
        <div class="metric"><div class="metric-name">Posttest completados</div><div class="metric-value">{{ report.statistics.posttestCompletedCount }}</div></div>
        <div class="metric"><div class="metric-name">Promedio pretest</div><div class="metric-value">{{ report.statistics.averagePretest }}</div></div>
        <div class="metric"><div class="metric-name">Promedio posttest</div><div class="metric-value">{{ report.statistics.averagePosttest }}</div></div>
        <div class="metric"><div class="metric-name">Adherencia</div><div class="metric-value">{{ report.statistics.adherenceRate }}%</div></div>
        <div class="metric"><div class="metric-name">Mejora</div><div class="metric-value">{{ report.statistics.improvementRate }}%</div></div>
        <div class="metric"><div class="metric-name">Aprobación</div><div class="metric-value">{{ report.statistics.passRate }}%</div></div>
    </div>
</div>

<div class="section">
    <h2>Participantes</h2>
    {% if report.participants %}
    <table>
        <thead>
            <tr>
                <th>Nombre</th><th>Servicio</th><th>Cargo</th><th>Profesión</th>
                <th>Sesión</th><th>Pretest</th><th>Posttest</th><th>Resultado</th>
            </tr>
        </thead>
        <tbody>
            {% for p in report.participants %}
            <tr>
                <td>{{ p.name }}</td>
                <td>{{ p.department | default(value="-") }}</td>
                <td>{{ p.role | default(value="-") }}</td>
                <td>{{ p.profession | default(value="-") }}</td>
                <td>{{ p.sessionCode | default(value="-") }}</td>
                <td>{{ p.pretestScore }}</td>
                <td>{{ p.posttestScore }}</td>
                <td>{% if p.passed %}<span class="pass">Aprobado</span>{% else %}<span class="fail">No aprobado</span>{% endif %}</td>
            </tr>
            {% endfor %}
        </tbody>
    </table>
    {% else %}
    <p>Sin participantes registrados.</p>
    {% endif %}
</div>
{% endblock content %}
"#;

const QUARTER_TEMPLATE: &str = r#"{% extends "base.html" %}
{% block title %}Reporte {{ report.label }}{% endblock title %}
{% block content %}
<div class="report-header">
    <h1>Reporte trimestral {{ report.label }}</h1>
    <div class="metadata">
        <p><strong>Periodo:</strong> {{ report.start }} a {{ report.end }}</p>
        <p><strong>Participantes únicos:</strong> {{ report.uniqueParticipants }}</p>
    </div>
</div>

{% if report.degraded %}
<div class="section warning">
    Datos incompletos: no se pudo leer {{ report.degraded | join(sep=", ") }}.
</div>
{% endif %}
{% if report.multiTrainingSessions %}
<div class="section warning">
    Sesiones vinculadas a varias capacitaciones (contadas en cada una): {{ report.multiTrainingSessions | join(sep=", ") }}.
</div>
{% endif %}

<div class="section">
    <h2>Resumen</h2>
    <div class="metrics">
        <div class="metric"><div class="metric-name">Capacitaciones</div><div class="metric-value">{{ report.trainings | length }}</div></div>
        <div class="metric"><div class="metric-name">Participaciones</div><div class="metric-value">{{ report.statistics.totalCount }}</div></div>
        <div class="metric"><div class="metric-name">Adherencia</div><div class="metric-value">{{ report.statistics.adherenceRate }}%</div></div>
        <div class="metric"><div class="metric-name">Aprobación</div><div class="metric-value">{{ report.statistics.passRate }}%</div></div>
        <div class="metric"><div class="metric-name">Mejora</div><div class="metric-value">{{ report.statistics.improvementRate }}%</div></div>
    </div>
</div>

<div class="section">
    <h2>Por mes</h2>
    <table>
        <thead><tr><th>Mes</th><th>Capacitaciones</th><th>Participaciones</th></tr></thead>
        <tbody>
            {% for m in report.months %}
            <tr><td>{{ m.name }}</td><td>{{ m.trainingCount }}</td><td>{{ m.participationCount }}</td></tr>
            {% endfor %}
        </tbody>
    </table>
</div>

<div class="section">
    <h2>Capacitaciones</h2>
    <table>
        <thead>
            <tr><th>Título</th><th>Fecha</th><th>Sesiones</th><th>Participantes</th><th>Adherencia</th><th>Aprobación</th></tr>
        </thead>
        <tbody>
            {% for t in report.trainings %}
            <tr>
                <td>{{ t.title }}</td>
                <td>{{ t.date | default(value="-") }}</td>
                <td>{{ t.sessionCount }}</td>
                <td>{{ t.statistics.totalCount }}</td>
                <td>{{ t.statistics.adherenceRate }}%</td>
                <td>{{ t.statistics.passRate }}%</td>
            </tr>
            {% endfor %}
        </tbody>
    </table>
</div>

<div class="section">
    <h2>Por servicio</h2>
    <table><tbody>{% for g in report.byDepartment %}<tr><td>{{ g.name }}</td><td>{{ g.count }}</td></tr>{% endfor %}</tbody></table>
</div>
<div class="section">
    <h2>Por cargo</h2>
    <table><tbody>{% for g in report.byRole %}<tr><td>{{ g.name }}</td><td>{{ g.count }}</td></tr>{% endfor %}</tbody></table>
</div>
<div class="section">
    <h2>Por profesión</h2>
    <table><tbody>{% for g in report.byProfession %}<tr><td>{{ g.name }}</td><td>{{ g.count }}</td></tr>{% endfor %}</tbody></table>
</div>
{% endblock content %}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::{Collections, TrainingBundle};
    use crate::stats::{build_quarter_report, build_training_report, PassPolicy, Quarter};
    use crate::testing::fixtures::{participation_in, session_linked, training_on};
    use serde_json::json;

    #[test]
    fn test_training_page_escapes_values() {
        let mut p = participation_in("P1", json!(["S1"]));
        p.name = "<script>alert(1)</script>".to_string();
        let bundle = TrainingBundle {
            training: training_on("T1", "RCP & Soporte", "2024-02-01"),
            sessions: vec![session_linked("S1", json!(["T1"]))],
            participations: vec![p],
            degraded: vec!["Sessions".to_string()],
        };
        let report = build_training_report(&bundle, &PassPolicy::default());
        let html = HtmlRenderer::new().unwrap().training(&report).unwrap();

        assert!(html.contains("RCP &amp; Soporte"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("Datos incompletos"));
    }

    #[test]
    fn test_quarter_page_renders_empty_quarter() {
        let report = build_quarter_report(
            &Collections::default(),
            Quarter::new(2024, 3).unwrap(),
            &PassPolicy::default(),
        );
        let html = HtmlRenderer::new().unwrap().quarter(&report).unwrap();
        assert!(html.contains("Q3 2024"));
        assert!(html.contains("Julio"));
    }
}
