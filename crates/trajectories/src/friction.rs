use crate::model::{FrictionModel, Model2Settings};

// SamosAT constants as used by AvaFrame.
pub const SAMOS_RS0: f32 = 0.222;
pub const SAMOS_KAPPA: f32 = 0.43;
pub const SAMOS_R: f32 = 0.05;
pub const SAMOS_B: f32 = 4.13;

/// Friction deceleration per unit mass in m/s^2.
pub fn friction_per_unit_mass(
    model: FrictionModel,
    params: &Model2Settings,
    speed: f32,
    cos_theta: f32,
) -> f32 {
    let g = params.gravity;
    let mu = params.friction_coeff;
    let h = params.slab_thickness;
    let rho = params.density;
    let speed_sq = speed * speed;
    let coulomb = mu * g * cos_theta;
    let voellmy = coulomb + g * speed_sq / (params.drag_coeff * h);
    match model {
        FrictionModel::None => 0.0,
        FrictionModel::Coulomb => coulomb,
        FrictionModel::Voellmy => voellmy,
        FrictionModel::VoellmyMinShear => voellmy.max(params.min_shear_stress / (rho * h)),
        FrictionModel::SamosAt => {
            let sigma = rho * g * h * cos_theta;
            let rs = if sigma > 0.0 { rho * speed_sq / sigma } else { 0.0 };
            let turbulence = (h / SAMOS_R).ln() / SAMOS_KAPPA + SAMOS_B;
            let tau = params.min_shear_stress
                + mu * (1.0 + SAMOS_RS0 / (SAMOS_RS0 + rs)) * sigma
                + rho * speed_sq / (turbulence * turbulence);
            tau / (rho * h)
        }
    }
}
