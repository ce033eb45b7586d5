use clam_core::{
    decide, encode, ChestPainType, ClinicalObservation, RestingEcg, RiskLabel, Sex, StSlope,
    Thalassemia, FEATURE_COUNT,
};
use proptest::prelude::*;

fn observation_strategy() -> impl Strategy<Value = ClinicalObservation> {
    (
        (1u32..=100, any::<bool>(), 0u8..=3, 80u32..=200, 100u32..=600),
        (any::<bool>(), 0u8..=2, 60u32..=220, any::<bool>()),
        (0.0f64..=6.2, 0u8..=2, 0u32..=3, 1u8..=3),
    )
        .prop_map(
            |(
                (age, male, cp, resting_bp, cholesterol),
                (fbs, restecg, max_heart_rate, exang),
                (oldpeak, slope, major_vessels, thal),
            )| ClinicalObservation {
                age,
                sex: if male { Sex::Male } else { Sex::Female },
                chest_pain: ChestPainType::try_from(cp).unwrap(),
                resting_bp,
                cholesterol,
                fasting_blood_sugar_high: fbs,
                resting_ecg: RestingEcg::try_from(restecg).unwrap(),
                max_heart_rate,
                exercise_angina: exang,
                st_depression: oldpeak,
                st_slope: StSlope::try_from(slope).unwrap(),
                major_vessels,
                thalassemia: Thalassemia::try_from(thal).unwrap(),
            },
        )
}

proptest! {
    #[test]
    fn valid_observations_encode_to_thirteen_features(obs in observation_strategy()) {
        let vector = encode(&obs).unwrap();
        prop_assert_eq!(vector.len(), FEATURE_COUNT);
        prop_assert_eq!(vector.as_slice().len(), FEATURE_COUNT);
        prop_assert_eq!(vector.get("age"), Some(f64::from(obs.age)));
        prop_assert_eq!(vector.get("oldpeak"), Some(obs.st_depression));
    }

    #[test]
    fn encoding_is_bit_identical(obs in observation_strategy()) {
        let first = encode(&obs).unwrap();
        let second = encode(&obs.clone()).unwrap();
        let first_bits: Vec<u64> = first.as_slice().iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u64> = second.as_slice().iter().map(|v| v.to_bits()).collect();
        prop_assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn upper_half_is_positive(p in 0.5f64..=1.0) {
        prop_assert_eq!(decide(p), RiskLabel::Positive);
    }

    #[test]
    fn lower_half_is_negative(p in 0.0f64..0.5) {
        prop_assert_eq!(decide(p), RiskLabel::Negative);
    }
}
