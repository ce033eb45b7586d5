mod config;

use std::path::PathBuf;

use anyhow::Context;
use clam_core::{
    binary_flag, ChestPainType, ClinicalObservation, ObservationDraft, RestingEcg, RiskAdapter,
    RiskError, Sex, StSlope, Thalassemia,
};
use clam_model::SharedModel;
use clam_narrative::{build_prompt, narrate, ChatCompletionClient};
use clam_report::{
    accuracy_banner, download_file_name, render_html, render_text, ClinicalReport,
    NarrativeSection, ReportStatus,
};
use clap::{Args as ClapArgs, Parser, ValueEnum};

use crate::config::ClamConfig;

#[derive(Parser, Debug)]
#[command(
    name = "clam-cli",
    about = "Đánh giá nguy cơ bệnh tim và tạo báo cáo lâm sàng."
)]
struct Args {
    /// Tên bệnh nhân hiển thị trên báo cáo.
    #[arg(long, default_value = "Patient")]
    patient: String,

    /// File JSON chứa quan sát (thay cho các cờ chỉ số bên dưới).
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[command(flatten)]
    vitals: VitalsArgs,

    /// Đường dẫn artifact mô hình.
    #[arg(long)]
    model: Option<PathBuf>,

    /// File cấu hình JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ghi báo cáo HTML ra file.
    #[arg(long)]
    html_out: Option<PathBuf>,

    /// Ghi báo cáo dạng text ra thư mục này (tên file `Report_<tên>.txt`).
    #[arg(long)]
    text_dir: Option<PathBuf>,

    /// Bỏ qua bước gọi dịch vụ tạo diễn giải.
    #[arg(long)]
    offline: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SexArg {
    Female,
    Male,
}

/// Các chỉ số nhập trực tiếp; giá trị mặc định giống form ban đầu.
#[derive(ClapArgs, Debug)]
struct VitalsArgs {
    #[arg(long, default_value_t = 50)]
    age: u32,
    #[arg(long, value_enum, default_value_t = SexArg::Male)]
    sex: SexArg,
    #[arg(long, default_value_t = 0, help = ChestPainType::help_text())]
    chest_pain: u8,
    #[arg(long, default_value_t = 120)]
    resting_bp: u32,
    #[arg(long, default_value_t = 240)]
    cholesterol: u32,
    /// Đường huyết lúc đói > 120 (0/1).
    #[arg(long, default_value_t = 0)]
    fasting_blood_sugar: u8,
    #[arg(long, default_value_t = 0, help = RestingEcg::help_text())]
    resting_ecg: u8,
    #[arg(long, default_value_t = 150)]
    max_heart_rate: u32,
    /// Đau thắt ngực khi gắng sức (0/1).
    #[arg(long, default_value_t = 0)]
    exercise_angina: u8,
    #[arg(long, default_value_t = 1.0)]
    st_depression: f64,
    #[arg(long, default_value_t = 0, help = StSlope::help_text())]
    st_slope: u8,
    #[arg(long, default_value_t = 0)]
    major_vessels: u32,
    #[arg(long, default_value_t = 1, help = Thalassemia::help_text())]
    thalassemia: u8,
}

impl VitalsArgs {
    fn to_observation(&self) -> Result<ClinicalObservation, RiskError> {
        Ok(ClinicalObservation {
            age: self.age,
            sex: match self.sex {
                SexArg::Female => Sex::Female,
                SexArg::Male => Sex::Male,
            },
            chest_pain: ChestPainType::try_from(self.chest_pain)?,
            resting_bp: self.resting_bp,
            cholesterol: self.cholesterol,
            fasting_blood_sugar_high: binary_flag("fasting_blood_sugar", self.fasting_blood_sugar)?,
            resting_ecg: RestingEcg::try_from(self.resting_ecg)?,
            max_heart_rate: self.max_heart_rate,
            exercise_angina: binary_flag("exercise_angina", self.exercise_angina)?,
            st_depression: self.st_depression,
            st_slope: StSlope::try_from(self.st_slope)?,
            major_vessels: self.major_vessels,
            thalassemia: Thalassemia::try_from(self.thalassemia)?,
        })
    }
}

fn read_observation(args: &Args, config: &ClamConfig) -> anyhow::Result<ClinicalObservation> {
    let observation = match &args.input {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("Không đọc được file {:?}", path))?;
            let draft: ObservationDraft = serde_json::from_str(&data)
                .with_context(|| format!("Dữ liệu bệnh nhân không hợp lệ trong {:?}", path))?;
            draft.complete(&config.feature_defaults)
        }
        None => args.vitals.to_observation()?,
    };
    observation.validate()?;
    Ok(observation)
}

fn run_assessment(model: &SharedModel, observation: &ClinicalObservation) -> ReportStatus {
    let classifier = match model.classifier() {
        Ok(classifier) => classifier,
        Err(err) => {
            eprintln!(
                "SYSTEM ALERT: '{}' not detected. Prediction functionality is disabled. ({err})",
                model.path().display()
            );
            return ReportStatus::ModelMissing;
        }
    };

    match RiskAdapter::new(classifier).assess(observation) {
        Ok(result) => ReportStatus::Assessed { result },
        Err(err) => {
            eprintln!("Error during diagnosis: {err}");
            ReportStatus::ClassifierFailed {
                reason: err.to_string(),
            }
        }
    }
}

fn generate_narrative(
    args: &Args,
    config: &ClamConfig,
    observation: &ClinicalObservation,
    status: &ReportStatus,
) -> NarrativeSection {
    if args.offline {
        return NarrativeSection::Unavailable("narrative generation skipped (offline mode)".to_string());
    }

    let prompt = build_prompt(
        &args.patient,
        observation,
        status.status_text(),
        &status.risk_percent(),
    );

    let outcome = ChatCompletionClient::new(config.narrative.clone())
        .and_then(|client| narrate(&client, &prompt));

    match outcome {
        Ok(text) => NarrativeSection::Text(text),
        Err(err) => {
            eprintln!("Error during synthesis: {err}");
            NarrativeSection::Unavailable(err.to_string())
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ClamConfig::load(path).context("Không nạp được cấu hình")?,
        None => ClamConfig::default(),
    };

    let observation = read_observation(&args, &config)?;

    let model = match args.model.clone().or_else(|| config.model_path.clone()) {
        Some(path) => SharedModel::new(path),
        None => SharedModel::beside_executable(),
    };
    log::info!("model artifact: {}", model.path().display());
    let accuracy = model.get().ok().and_then(|m| m.accuracy());
    if let Some(banner) = accuracy_banner(accuracy) {
        println!("{banner}");
    }

    println!(
        "Patient: {} ({}, {})",
        args.patient,
        observation.age,
        observation.sex.label()
    );
    let status = run_assessment(&model, &observation);
    println!(
        "Diagnostic status: {} ({}%)",
        status.status_text(),
        status.risk_percent()
    );

    let narrative = generate_narrative(&args, &config, &observation, &status);
    let report = ClinicalReport::new(args.patient.clone(), observation.age, status, narrative)
        .with_model_accuracy(accuracy);

    match &args.html_out {
        Some(path) => {
            std::fs::write(path, render_html(&report))
                .with_context(|| format!("Không ghi được báo cáo HTML {:?}", path))?;
            println!("HTML report: {}", path.display());
        }
        None => println!("\n{}", render_text(&report)),
    }

    if let Some(dir) = &args.text_dir {
        let path = dir.join(download_file_name(&args.patient));
        std::fs::write(&path, render_text(&report))
            .with_context(|| format!("Không ghi được báo cáo text {:?}", path))?;
        println!("Text report: {}", path.display());
    }

    Ok(())
}
