use rusqlite::Connection;
use time::macros::date;
use time::{Date, Duration};

use crate::error::AppError;
use crate::filter::DateWindow;
use crate::ingest::service_orders_csv::{
    import_service_orders_csv, ServiceOrderCsvMapping, ServiceOrderImportSummary,
};

const MODELS: [&str; 3] = ["Urban Bus 12m", "Articulated 18m", "Minibus 8m"];
const WORKSHOPS: [&str; 2] = ["Central Garage", "North Depot"];
const MECHANICS: [&str; 4] = ["A. Souza", "B. Lima", "C. Rocha", "D. Alves"];
const SERVICES: [(&str, &str); 4] = [
    ("BRAKE PAD REPLACEMENT", "Brakes"),
    ("AIR SYSTEM LEAK", "Pneumatics"),
    ("ENGINE OVERHEATING", "Engine"),
    ("DOOR ACTUATOR", "Body"),
];
// Days between a close and the next opening; values at or below 10 produce rework.
const GAPS: [i64; 7] = [4, 35, 6, 52, 9, 80, 2];

/// Calendar year covered by the demo dataset.
pub fn demo_window() -> DateWindow {
    DateWindow::new(date!(2024 - 01 - 01), date!(2024 - 12 - 31))
}

fn ts(day: Date, hour: u8) -> String {
    format!("{day} {hour:02}:00:00")
}

fn demo_csv() -> String {
    // Deterministic fleet history: same output on every call.
    let mut out = String::new();
    out.push_str(
        "NUMERO DA OS,CODIGO DO VEICULO,DESCRICAO DO SERVICO,DATA DA ABERTURA DA OS,\
         DATA DO FECHAMENTO DA OS,DESCRICAO DO TIPO DA OS,DESCRICAO DA OFICINA,\
         DESCRICAO DA SECAO,DESCRICAO DO MODELO,COLABORADOR QUE EXECUTOU O SERVICO,VALOR\n",
    );

    let base = date!(2024 - 01 - 02);
    let mut n = 0usize;
    for v in 1..=12usize {
        let vehicle = format!("BUS-{:03}", 100 + v);
        let model = MODELS[v % MODELS.len()];
        let workshop = WORKSHOPS[v % WORKSHOPS.len()];

        for (s, (service, section)) in SERVICES.iter().enumerate() {
            let mut opened = base + Duration::days((v * 7 + s * 11) as i64);
            let orders = 2 + (v + s) % 4;
            for k in 0..orders {
                n += 1;
                let closed = opened + Duration::days(1 + (k % 2) as i64);
                let mechanic = MECHANICS[(v + k) % MECHANICS.len()];
                let cost = format!("\"{},{:02}\"", 150 + (n * 37) % 900, n % 100);
                // The most recent order of every fourth vehicle is still open.
                let closed_field = if v % 4 == 0 && k + 1 == orders {
                    String::new()
                } else {
                    ts(closed, 17)
                };
                out.push_str(&format!(
                    "OS-{n:05},{vehicle},{service},{},{closed_field},OFICINA,{workshop},{section},{model},{mechanic},{cost}\n",
                    ts(opened, 8),
                ));
                opened = closed + Duration::days(GAPS[(v + s + k) % GAPS.len()]);
            }
        }
    }

    // Preventive orders are not workshop corrections and get excluded during normalization.
    for i in 1..=3usize {
        n += 1;
        let day = base + Duration::days((i * 30) as i64);
        out.push_str(&format!(
            "OS-{n:05},BUS-{:03},BRAKE PAD REPLACEMENT,{},{},PREVENTIVA,Central Garage,Brakes,Urban Bus 12m,A. Souza,\"90,00\"\n",
            100 + i,
            ts(day, 8),
            ts(day, 12),
        ));
    }
    out
}

/// Load the demo fleet history into `service_orders`.
pub fn seed_demo_dataset(conn: &mut Connection) -> Result<ServiceOrderImportSummary, AppError> {
    import_service_orders_csv(conn, &demo_csv(), &ServiceOrderCsvMapping::default())
}
