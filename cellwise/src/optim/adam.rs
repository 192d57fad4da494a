use crate::common::*;

#[derive(Debug, Clone)]
pub struct AdamInit {
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdamInit {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl AdamInit {
    /// Builds an optimizer over the trainable variables of the store.
    pub fn build(self, vs: &nn::VarStore, lr: f64) -> Result<Adam> {
        let Self {
            beta1,
            beta2,
            eps,
            weight_decay,
        } = self;

        ensure!(
            (0.0..1.0).contains(&beta1) && (0.0..1.0).contains(&beta2),
            "betas must be in range [0, 1)"
        );
        ensure!(eps > 0.0, "eps must be positive");
        ensure!(weight_decay >= 0.0, "weight_decay must be non-negative");
        ensure!(lr >= 0.0, "lr must be non-negative");

        let params: Vec<(String, Tensor)> = vs
            .variables()
            .into_iter()
            .filter(|(_, var)| var.requires_grad())
            .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
            .collect();
        let zeros = || -> Vec<Tensor> {
            tch::no_grad(|| params.iter().map(|(_, var)| var.zeros_like()).collect())
        };
        let exp_avg = zeros();
        let exp_avg_sq = zeros();

        Ok(Adam {
            params,
            exp_avg,
            exp_avg_sq,
            step: 0,
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        })
    }
}

/// Adam with moment buffers that can be saved and restored.
#[derive(Debug)]
pub struct Adam {
    params: Vec<(String, Tensor)>,
    exp_avg: Vec<Tensor>,
    exp_avg_sq: Vec<Tensor>,
    step: i64,
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    weight_decay: f64,
}

impl Adam {
    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }

    /// The number of optimization steps taken so far.
    pub fn num_steps(&self) -> i64 {
        self.step
    }

    pub fn zero_grad(&mut self) {
        for (_, param) in &mut self.params {
            param.zero_grad();
        }
    }

    /// Rescales gradients so that their global L2 norm is at most `max_norm`.
    ///
    /// Returns the norm before clipping.
    pub fn clip_grad_norm(&mut self, max_norm: f64) -> f64 {
        let grads: Vec<Tensor> = self
            .params
            .iter()
            .map(|(_, param)| param.grad())
            .filter(|grad| grad.defined())
            .collect();
        if grads.is_empty() {
            return 0.0;
        }

        tch::no_grad(|| {
            let total_norm = grads
                .iter()
                .map(|grad| f64::from(grad.norm()).powi(2))
                .sum::<f64>()
                .sqrt();

            let coef = max_norm / (total_norm + 1e-6);
            if coef < 1.0 {
                for mut grad in grads {
                    let clipped = &grad * coef;
                    grad.copy_(&clipped);
                }
            }
            total_norm
        })
    }

    /// Updates the parameters with the accumulated gradients.
    pub fn step(&mut self) {
        let Self {
            ref mut params,
            ref mut exp_avg,
            ref mut exp_avg_sq,
            ref mut step,
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        } = *self;

        *step += 1;
        let bias_correction1 = 1.0 - beta1.powi(*step as i32);
        let bias_correction2 = 1.0 - beta2.powi(*step as i32);

        tch::no_grad(|| {
            let iter = izip!(params.iter_mut(), exp_avg.iter_mut(), exp_avg_sq.iter_mut());
            for ((_, param), m, v) in iter {
                let grad = param.grad();
                if !grad.defined() {
                    continue;
                }
                let grad = if weight_decay != 0.0 {
                    &grad + &*param * weight_decay
                } else {
                    grad
                };

                let new_m = &*m * beta1 + &grad * (1.0 - beta1);
                let new_v = &*v * beta2 + &grad * &grad * (1.0 - beta2);
                m.copy_(&new_m);
                v.copy_(&new_v);

                let denom = (&new_v / bias_correction2).sqrt() + eps;
                let update = &new_m / bias_correction1 / denom * lr;
                let new_param = &*param - update;
                param.copy_(&new_param);
            }
        });
    }

    /// Saves the step count and moment buffers.
    pub fn save(&self, path: &Path) -> Result<()> {
        let step = Tensor::from(self.step);
        let mut named: Vec<(String, Tensor)> = vec![("step".to_string(), step)];
        for ((name, _), m, v) in izip!(&self.params, &self.exp_avg, &self.exp_avg_sq) {
            named.push((format!("exp_avg.{}", name), m.to_device(Device::Cpu)));
            named.push((format!("exp_avg_sq.{}", name), v.to_device(Device::Cpu)));
        }
        Tensor::save_multi(&named, path)
            .with_context(|| format!("failed to save optimizer state to '{}'", path.display()))?;
        Ok(())
    }

    /// Restores the step count and moment buffers saved by [Adam::save].
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let mut named: HashMap<String, Tensor> = Tensor::load_multi(path)
            .with_context(|| format!("failed to load optimizer state from '{}'", path.display()))?
            .into_iter()
            .collect();

        let step = named
            .remove("step")
            .ok_or_else(|| format_err!("missing 'step' in '{}'", path.display()))?;
        let step = i64::from(&step);

        let mut take = |key: String, target: &Tensor| -> Result<Tensor> {
            let tensor = named
                .remove(&key)
                .ok_or_else(|| format_err!("missing '{}' in '{}'", key, path.display()))?;
            ensure!(
                tensor.size() == target.size(),
                "shape mismatch for '{}': expect {:?}, but get {:?}",
                key,
                target.size(),
                tensor.size()
            );
            Ok(tensor)
        };

        let mut loaded = vec![];
        for ((name, _), m, v) in izip!(&self.params, &self.exp_avg, &self.exp_avg_sq) {
            let new_m = take(format!("exp_avg.{}", name), m)?;
            let new_v = take(format!("exp_avg_sq.{}", name), v)?;
            loaded.push((new_m, new_v));
        }
        ensure!(
            named.is_empty(),
            "unexpected entries in '{}': {}",
            path.display(),
            named.keys().sorted().join(", ")
        );

        tch::no_grad(|| {
            for ((new_m, new_v), m, v) in izip!(loaded, &mut self.exp_avg, &mut self.exp_avg_sq) {
                m.copy_(&new_m);
                v.copy_(&new_v);
            }
        });
        self.step = step;
        Ok(())
    }
}
