//! Borrowed rectangular views into an image.
//!
//! A view is a non-owning window onto an [`Image`]'s buffer. Its rectangle
//! is checked against the source image at construction and on resize, so a
//! valid view can never read outside the buffer. Views of views compose
//! their origins at construction and keep a direct reference to the
//! underlying image; indirection never chains.
//!
//! Pixel access is in view-local coordinates; [`ImageLike::rect`] reports
//! the view's position in the global frame (image origin + view offset).
//!
//! # Example
//!
//! ```
//! use piv_core::{Gray, GfImage, ImageLike, Point2, Rect, Size};
//!
//! let mut im = GfImage::with_size(Size::new(8, 8));
//! im[(3, 4)] = Gray(1.0);
//!
//! let v = im.view(Rect::new(Point2::new(2, 2), Size::new(4, 4))).unwrap();
//! assert_eq!(v.at(1, 2), Gray(1.0));
//! assert_eq!(v.rect().bottom_left(), Point2::new(2, 2));
//! ```

use crate::error::{Error, Result};
use crate::image::{Image, ImageLike, ImageLikeMut};
use crate::pixel::Pixel;
use crate::point::Point2;
use crate::rect::Rect;
use crate::size::Size;

fn checked_region(rect: Rect, image_size: Size) -> Result<Rect> {
    let bounds = Rect::from_size(image_size);
    if !rect.within(&bounds) {
        return Err(Error::invalid_region(rect, bounds));
    }
    Ok(rect)
}

fn compose(parent: Rect, child: Rect) -> Rect {
    Rect::new(
        Point2::new(
            parent.left() + child.left(),
            parent.bottom() + child.bottom(),
        ),
        child.size(),
    )
}

/// A read-only rectangular view into an [`Image`].
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a, P: Pixel> {
    image: &'a Image<P>,
    /// View rectangle in the image's local frame.
    rect: Rect,
}

impl<'a, P: Pixel> ImageView<'a, P> {
    /// Creates a view of `rect`, given in the image's local frame.
    ///
    /// Fails if the rectangle is not wholly contained in the image.
    pub fn new(image: &'a Image<P>, rect: Rect) -> Result<Self> {
        Ok(Self {
            image,
            rect: checked_region(rect, image.size())?,
        })
    }

    /// Creates a view within this view; `rect` is relative to this view's
    /// origin. The result references the underlying image directly.
    pub fn sub_view(&self, rect: Rect) -> Result<ImageView<'a, P>> {
        ImageView::new(self.image, compose(self.rect, rect))
    }

    /// The view rectangle in the image's local frame.
    #[inline]
    pub fn region(&self) -> Rect {
        self.rect
    }

    /// The image this view reads from.
    #[inline]
    pub fn underlying(&self) -> &'a Image<P> {
        self.image
    }

    /// Changes the viewed area, keeping the bottom-left corner.
    ///
    /// Fails if the resized view would leave the image.
    pub fn resize(&mut self, size: Size) -> Result<()> {
        self.rect = checked_region(Rect::new(self.rect.bottom_left(), size), self.image.size())?;
        Ok(())
    }

    /// Bounds-checked bidirectional pixel iterator in row-major order.
    pub fn iter(&self) -> ViewIter<'a, P> {
        ViewIter {
            image: self.image,
            rect: self.rect,
            front: 0,
            back: self.rect.area(),
        }
    }
}

impl<P: Pixel> ImageLike for ImageView<'_, P> {
    type Pixel = P;

    #[inline]
    fn size(&self) -> Size {
        self.rect.size()
    }

    #[inline]
    fn rect(&self) -> Rect {
        compose(self.image.rect(), self.rect)
    }

    #[inline]
    fn line(&self, h: u32) -> &[P] {
        assert!(h < self.height(), "line {h} out of range");
        let left = self.rect.left() as usize;
        let row = self.image.line(self.rect.bottom() as u32 + h);
        &row[left..left + self.width() as usize]
    }
}

/// Row-major pixel iterator over a view.
///
/// Bidirectional; both ends stop cleanly at the view bounds.
#[derive(Debug, Clone)]
pub struct ViewIter<'a, P: Pixel> {
    image: &'a Image<P>,
    rect: Rect,
    front: usize,
    back: usize,
}

impl<P: Pixel> ViewIter<'_, P> {
    #[inline]
    fn pixel(&self, i: usize) -> P {
        let w = self.rect.width() as usize;
        let x = self.rect.left() as usize + i % w;
        let y = self.rect.bottom() as usize + i / w;
        self.image[(x as u32, y as u32)]
    }
}

impl<P: Pixel> Iterator for ViewIter<'_, P> {
    type Item = P;

    #[inline]
    fn next(&mut self) -> Option<P> {
        if self.front >= self.back {
            return None;
        }
        let p = self.pixel(self.front);
        self.front += 1;
        Some(p)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl<P: Pixel> DoubleEndedIterator for ViewIter<'_, P> {
    #[inline]
    fn next_back(&mut self) -> Option<P> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.pixel(self.back))
    }
}

impl<P: Pixel> ExactSizeIterator for ViewIter<'_, P> {}

/// A writable rectangular view into an [`Image`].
#[derive(Debug)]
pub struct ImageViewMut<'a, P: Pixel> {
    image: &'a mut Image<P>,
    /// View rectangle in the image's local frame.
    rect: Rect,
}

impl<'a, P: Pixel> ImageViewMut<'a, P> {
    /// Creates a writable view of `rect`, given in the image's local
    /// frame. Fails if the rectangle is not wholly contained.
    pub fn new(image: &'a mut Image<P>, rect: Rect) -> Result<Self> {
        let rect = checked_region(rect, image.size())?;
        Ok(Self { image, rect })
    }

    /// Creates a writable view within this view; `rect` is relative to
    /// this view's origin.
    pub fn sub_view_mut(&mut self, rect: Rect) -> Result<ImageViewMut<'_, P>> {
        ImageViewMut::new(self.image, compose(self.rect, rect))
    }

    /// The view rectangle in the image's local frame.
    #[inline]
    pub fn region(&self) -> Rect {
        self.rect
    }

    /// Changes the viewed area, keeping the bottom-left corner.
    pub fn resize(&mut self, size: Size) -> Result<()> {
        self.rect = checked_region(Rect::new(self.rect.bottom_left(), size), self.image.size())?;
        Ok(())
    }
}

impl<P: Pixel> ImageLike for ImageViewMut<'_, P> {
    type Pixel = P;

    #[inline]
    fn size(&self) -> Size {
        self.rect.size()
    }

    #[inline]
    fn rect(&self) -> Rect {
        compose(self.image.rect(), self.rect)
    }

    #[inline]
    fn line(&self, h: u32) -> &[P] {
        assert!(h < self.height(), "line {h} out of range");
        let left = self.rect.left() as usize;
        let row = self.image.line(self.rect.bottom() as u32 + h);
        &row[left..left + self.width() as usize]
    }
}

impl<P: Pixel> ImageLikeMut for ImageViewMut<'_, P> {
    #[inline]
    fn line_mut(&mut self, h: u32) -> &mut [P] {
        assert!(h < self.height(), "line {h} out of range");
        let left = self.rect.left() as usize;
        let width = self.width() as usize;
        let row = self.image.line_mut(self.rect.bottom() as u32 + h);
        &mut row[left..left + width]
    }
}
